use hickory_proto::op::Query;
use hickory_proto::rr::{DNSClass, Name, RecordSet, RecordType};

use crate::error::ResolveError;

/// Single-shot continuation handed to a [`Resolver`] with each query.
pub type Completion = Box<dyn FnOnce(Result<RecordSet, ResolveError>) + Send + 'static>;

/// Whatever actually talks to the network on behalf of the store.
///
/// Implementations may run `completion` synchronously inside `submit` or
/// later from their own I/O context; the store copes with both. No retry is
/// expected: a failure is recorded and retried lazily once it expires.
pub trait Resolver: Send + Sync {
    fn submit(&self, query: Query, completion: Completion);
}

/// Boxes `f` as a [`Completion`] that reports [`ResolveError::Abandoned`] if
/// the resolver drops it without ever calling it.
pub fn completion<F>(f: F) -> Completion
where
    F: FnOnce(Result<RecordSet, ResolveError>) + Send + 'static,
{
    struct Guard<F>(Option<F>)
    where
        F: FnOnce(Result<RecordSet, ResolveError>);

    impl<F> Drop for Guard<F>
    where
        F: FnOnce(Result<RecordSet, ResolveError>),
    {
        fn drop(&mut self) {
            if let Some(f) = self.0.take() {
                f(Err(ResolveError::Abandoned));
            }
        }
    }

    let guard = Guard(Some(f));
    Box::new(move |result| {
        let mut guard = guard;
        if let Some(f) = guard.0.take() {
            f(result);
        }
    })
}

pub fn make_query(name: &Name, record_type: RecordType, class: DNSClass) -> Query {
    let mut query = Query::query(name.clone(), record_type);
    query.set_query_class(class);
    query
}
