use std::net::IpAddr;
use std::time::Duration;

use serde::Deserialize;

/// Weight kept from the previous RTT when folding in a new sample.
const RTT_SMOOTHING: f64 = 0.7;

/// Which address families a caller is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressRequest {
    V4Only,
    V6Only,
    Any,
}

impl AddressRequest {
    #[inline]
    pub fn matches(self, ip: &IpAddr) -> bool {
        match self {
            AddressRequest::V4Only => ip.is_ipv4(),
            AddressRequest::V6Only => ip.is_ipv6(),
            AddressRequest::Any => true,
        }
    }
}

/// One address of a nameserver together with what we measured about it.
#[derive(Debug, Clone, PartialEq)]
pub struct AddressEntry {
    ip: IpAddr,
    rtt: Duration,
    unreachable: bool,
    measured: bool,
}

impl AddressEntry {
    pub fn new(ip: IpAddr) -> Self {
        Self {
            ip,
            rtt: Duration::ZERO,
            unreachable: false,
            measured: false,
        }
    }

    pub fn with_rtt(ip: IpAddr, rtt: Duration) -> Self {
        Self {
            ip,
            rtt,
            unreachable: false,
            measured: true,
        }
    }

    #[inline]
    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    #[inline]
    pub fn rtt(&self) -> Duration {
        self.rtt
    }

    #[inline]
    pub fn is_unreachable(&self) -> bool {
        self.unreachable
    }

    #[inline]
    pub fn is_v4(&self) -> bool {
        self.ip.is_ipv4()
    }

    #[inline]
    pub fn is_v6(&self) -> bool {
        self.ip.is_ipv6()
    }

    /// Stores `rtt` verbatim and clears the unreachable mark.
    pub fn set_rtt(&mut self, rtt: Duration) {
        self.rtt = rtt;
        self.unreachable = false;
        self.measured = true;
    }

    /// Folds a new sample into the smoothed RTT.
    ///
    /// The first sample replaces the initial value outright so an address
    /// is not dragged towards zero by the unmeasured default.
    pub fn update_rtt(&mut self, sample: Duration) {
        if !self.measured || self.unreachable {
            self.set_rtt(sample);
            return;
        }
        let smoothed =
            self.rtt.as_secs_f64() * RTT_SMOOTHING + sample.as_secs_f64() * (1.0 - RTT_SMOOTHING);
        self.rtt = Duration::from_secs_f64(smoothed);
    }

    pub fn set_unreachable(&mut self) {
        self.unreachable = true;
    }
}
