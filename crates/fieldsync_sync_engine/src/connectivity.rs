//! Connectivity monitoring.
//!
//! The host platform reports what it knows about the network as a
//! [`NetworkSignal`]. The monitor classifies it, publishes the result on a
//! watch channel and tells the scheduler how often to sync. It never runs
//! sync logic itself.

use crate::config::ConnectivityConfig;
use std::fmt;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

/// Coarse quality of the current connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkQuality {
    /// Fast enough for regular syncing.
    Good,
    /// Usable but slow; sync less often.
    Degraded,
    /// No connection.
    Offline,
}

impl fmt::Display for NetworkQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Good => "good",
            Self::Degraded => "degraded",
            Self::Offline => "offline",
        })
    }
}

/// What the platform reports about the network.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkSignal {
    /// Whether any connection is available.
    pub online: bool,
    /// Connection class such as `4g`, `3g` or `slow-2g`, if known.
    pub effective_type: Option<String>,
    /// Estimated downlink bandwidth in Mbps, if known.
    pub downlink_mbps: Option<f64>,
    /// Estimated round-trip time in milliseconds, if known.
    pub rtt_ms: Option<u32>,
}

impl NetworkSignal {
    /// An online signal with no quality hints.
    pub fn online() -> Self {
        Self {
            online: true,
            ..Self::default()
        }
    }

    /// An offline signal.
    pub fn offline() -> Self {
        Self::default()
    }

    /// Sets the connection class.
    pub fn with_effective_type(mut self, effective_type: impl Into<String>) -> Self {
        self.effective_type = Some(effective_type.into());
        self
    }

    /// Sets the downlink estimate.
    pub fn with_downlink(mut self, mbps: f64) -> Self {
        self.downlink_mbps = Some(mbps);
        self
    }

    /// Sets the round-trip estimate.
    pub fn with_rtt(mut self, rtt_ms: u32) -> Self {
        self.rtt_ms = Some(rtt_ms);
        self
    }
}

/// Connection classes treated as degraded.
const SLOW_EFFECTIVE_TYPES: &[&str] = &["slow-2g", "2g", "3g"];

/// Classifies a signal.
pub fn classify(signal: &NetworkSignal, config: &ConnectivityConfig) -> NetworkQuality {
    if !signal.online {
        return NetworkQuality::Offline;
    }
    let slow_type = signal
        .effective_type
        .as_deref()
        .is_some_and(|t| SLOW_EFFECTIVE_TYPES.contains(&t.to_ascii_lowercase().as_str()));
    let slow_link = signal
        .downlink_mbps
        .is_some_and(|mbps| mbps < config.degraded_downlink_mbps);
    let slow_rtt = signal.rtt_ms.is_some_and(|rtt| rtt > config.degraded_rtt_ms);

    if slow_type || slow_link || slow_rtt {
        NetworkQuality::Degraded
    } else {
        NetworkQuality::Good
    }
}

/// Published connectivity state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityState {
    /// Whether the device is online.
    pub online: bool,
    /// Connection quality.
    pub quality: NetworkQuality,
}

/// How a new signal changed the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Offline to online.
    WentOnline,
    /// Online to offline.
    WentOffline,
    /// Still online, different quality.
    QualityChanged,
    /// Nothing changed.
    Unchanged,
}

/// Tracks connectivity and distributes changes.
#[derive(Debug)]
pub struct ConnectivityMonitor {
    config: ConnectivityConfig,
    state: watch::Sender<ConnectivityState>,
}

impl ConnectivityMonitor {
    /// Creates a monitor in the configured initial state.
    pub fn new(config: ConnectivityConfig) -> Self {
        let initial = if config.initially_online {
            ConnectivityState {
                online: true,
                quality: NetworkQuality::Good,
            }
        } else {
            ConnectivityState {
                online: false,
                quality: NetworkQuality::Offline,
            }
        };
        let (state, _) = watch::channel(initial);
        Self { config, state }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ConnectivityConfig {
        &self.config
    }

    /// Applies a platform signal.
    pub fn report(&self, signal: &NetworkSignal) -> Transition {
        let next = ConnectivityState {
            online: signal.online,
            quality: classify(signal, &self.config),
        };
        let previous = self.state.send_replace(next);
        let transition = match (previous.online, next.online) {
            (false, true) => Transition::WentOnline,
            (true, false) => Transition::WentOffline,
            _ if previous.quality != next.quality => Transition::QualityChanged,
            _ => Transition::Unchanged,
        };
        if transition != Transition::Unchanged {
            info!(?transition, quality = %next.quality, "connectivity changed");
        }
        transition
    }

    /// Shorthand for reporting a bare online or offline signal.
    pub fn set_online(&self, online: bool) -> Transition {
        let signal = if online {
            NetworkSignal::online()
        } else {
            NetworkSignal::offline()
        };
        self.report(&signal)
    }

    /// Current state.
    pub fn state(&self) -> ConnectivityState {
        *self.state.borrow()
    }

    /// Returns true if the device is online.
    pub fn is_online(&self) -> bool {
        self.state.borrow().online
    }

    /// Current quality.
    pub fn quality(&self) -> NetworkQuality {
        self.state.borrow().quality
    }

    /// Periodic sync interval for the current quality, `None` while offline.
    pub fn sync_interval(&self) -> Option<Duration> {
        match self.quality() {
            NetworkQuality::Good => Some(self.config.good_interval),
            NetworkQuality::Degraded => Some(self.config.degraded_interval),
            NetworkQuality::Offline => None,
        }
    }

    /// Subscribes to state changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.state.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(ConnectivityConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let config = ConnectivityConfig::default();
        assert_eq!(classify(&NetworkSignal::offline(), &config), NetworkQuality::Offline);
        assert_eq!(classify(&NetworkSignal::online(), &config), NetworkQuality::Good);
        assert_eq!(
            classify(&NetworkSignal::online().with_effective_type("4g"), &config),
            NetworkQuality::Good
        );
        assert_eq!(
            classify(&NetworkSignal::online().with_effective_type("2G"), &config),
            NetworkQuality::Degraded
        );
        assert_eq!(
            classify(&NetworkSignal::online().with_downlink(0.4), &config),
            NetworkQuality::Degraded
        );
        assert_eq!(
            classify(&NetworkSignal::online().with_rtt(1500), &config),
            NetworkQuality::Degraded
        );
    }

    #[test]
    fn transitions() {
        let config = ConnectivityConfig::default().with_initially_online(false);
        let monitor = ConnectivityMonitor::new(config);
        assert!(!monitor.is_online());
        assert_eq!(monitor.sync_interval(), None);

        assert_eq!(monitor.set_online(true), Transition::WentOnline);
        assert_eq!(monitor.set_online(true), Transition::Unchanged);
        assert_eq!(
            monitor.report(&NetworkSignal::online().with_effective_type("3g")),
            Transition::QualityChanged
        );
        assert_eq!(monitor.sync_interval(), Some(Duration::from_secs(300)));
        assert_eq!(monitor.set_online(false), Transition::WentOffline);
    }

    #[test]
    fn interval_follows_quality() {
        let monitor = ConnectivityMonitor::default();
        assert_eq!(monitor.sync_interval(), Some(Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn subscribers_see_changes() {
        let monitor = ConnectivityMonitor::default();
        let mut rx = monitor.subscribe();

        monitor.set_online(false);
        rx.changed().await.unwrap();
        assert!(!rx.borrow_and_update().online);
    }
}
