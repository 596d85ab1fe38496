//! IP allow/deny lists and automatic temporary blocking.
//!
//! Static lists match exact addresses or CIDR ranges. The dynamic block list
//! maps an address to its expiry and is purged lazily on lookup and during
//! sweeps. Violation counters live on the per-IP limiter entries, so the
//! counter that triggers a block is the same one the IP bucket uses.

use crate::application::ports::Storage;
use crate::application::registry::LimiterRegistry;
use crate::domain::bucket::Quota;
use crate::domain::policy::IpConfig;
use crate::infrastructure::storage::ShardedStorage;
use ipnet::IpNet;
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// Key of the per-IP limiter entry for `ip`.
pub fn ip_key(ip: &IpAddr) -> String {
    format!("ip:{}", ip)
}

/// Exact addresses plus CIDR ranges.
#[derive(Debug, Clone, Default)]
pub struct IpList {
    exact: HashSet<IpAddr>,
    networks: Vec<IpNet>,
}

impl IpList {
    /// Build a list from exact addresses and networks.
    pub fn new(exact: &[IpAddr], networks: &[IpNet]) -> Self {
        Self {
            exact: exact.iter().copied().map(canonical_ip).collect(),
            networks: networks.to_vec(),
        }
    }

    /// Whether `ip` is listed exactly or falls inside a listed network.
    pub fn contains(&self, ip: &IpAddr) -> bool {
        let ip = canonical_ip(*ip);
        self.exact.contains(&ip) || self.networks.iter().any(|net| net.contains(&ip))
    }

    /// Number of exact entries plus networks.
    pub fn len(&self) -> usize {
        self.exact.len() + self.networks.len()
    }

    /// Check if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.networks.is_empty()
    }
}

/// Treat IPv4-mapped IPv6 addresses as their IPv4 form.
pub fn canonical_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map_or(IpAddr::V6(v6), IpAddr::V4),
        v4 => v4,
    }
}

/// Default block list storage.
pub type BlockStorage = ShardedStorage<IpAddr, Instant>;

/// Static and dynamic IP access control.
#[derive(Debug)]
pub struct IpAccessControl<S = BlockStorage>
where
    S: Storage<IpAddr, Instant>,
{
    whitelist: IpList,
    blacklist: IpList,
    blocked: S,
    ip_limiters: Arc<LimiterRegistry>,
    ip_quota: Quota,
    block_duration: Duration,
    auto_block_threshold: u32,
}

impl IpAccessControl<BlockStorage> {
    /// Build access control from the IP policy.
    ///
    /// `ip_limiters` is the per-IP registry whose entries carry the
    /// violation counters.
    pub fn new(config: &IpConfig, ip_limiters: Arc<LimiterRegistry>) -> Self {
        Self::with_storage(config, ip_limiters, BlockStorage::new())
    }
}

impl<S> IpAccessControl<S>
where
    S: Storage<IpAddr, Instant>,
{
    /// Build access control over the given block list storage.
    pub fn with_storage(config: &IpConfig, ip_limiters: Arc<LimiterRegistry>, blocked: S) -> Self {
        Self {
            whitelist: IpList::new(&config.whitelist_ips, &config.whitelist_cidrs),
            blacklist: IpList::new(&config.blacklist_ips, &config.blacklist_cidrs),
            blocked,
            ip_limiters,
            ip_quota: Quota::per_second(
                f64::from(config.default_rps),
                f64::from(config.default_burst),
            ),
            block_duration: config.block_duration,
            auto_block_threshold: config.auto_block_threshold,
        }
    }

    /// Whether `ip` is on the static allow list.
    pub fn is_whitelisted(&self, ip: &IpAddr) -> bool {
        self.whitelist.contains(ip)
    }

    /// Whether `ip` is on the static deny list.
    pub fn is_blacklisted(&self, ip: &IpAddr) -> bool {
        self.blacklist.contains(ip)
    }

    /// Remaining block time if `ip` is automatically blocked.
    ///
    /// An expired entry is removed as a side effect.
    pub fn auto_block_remaining(&self, ip: &IpAddr, now: Instant) -> Option<Duration> {
        let ip = canonical_ip(*ip);
        let expires_at = self.blocked.get_cloned(&ip)?;
        if now < expires_at {
            return Some(expires_at - now);
        }
        self.blocked.remove_if(&ip, |_, expires_at| now >= *expires_at);
        None
    }

    /// Whether `ip` is automatically blocked at `now`.
    pub fn is_auto_blocked(&self, ip: &IpAddr, now: Instant) -> bool {
        self.auto_block_remaining(ip, now).is_some()
    }

    /// Count a violation for `ip`, blocking it once the threshold is reached.
    ///
    /// The counter resets when the block is placed.
    ///
    /// # Returns
    /// `true` only for the call that placed the block
    pub fn record_violation(&self, ip: &IpAddr, now: Instant) -> bool {
        let ip = canonical_ip(*ip);
        let reached = self.ip_limiters.record_violation_until(
            &ip_key(&ip),
            &[self.ip_quota],
            self.auto_block_threshold,
            now,
        );
        let Some(violations) = reached else {
            return false;
        };

        let expires_at = now.checked_add(self.block_duration).unwrap_or(now);
        self.blocked
            .with_entry_mut(ip, || expires_at, |current| *current = expires_at);
        warn!(
            %ip,
            violations,
            block_secs = self.block_duration.as_secs(),
            "ip auto-blocked"
        );
        true
    }

    /// Reset the violation counter of `ip`.
    pub fn clear_violations(&self, ip: &IpAddr) {
        self.ip_limiters.clear_violations(&ip_key(&canonical_ip(*ip)));
    }

    /// Current violation count of `ip`.
    pub fn violations(&self, ip: &IpAddr) -> u32 {
        self.ip_limiters.violations(&ip_key(&canonical_ip(*ip)))
    }

    /// Drop expired automatic blocks.
    ///
    /// # Returns
    /// Number of entries removed
    pub fn purge_expired(&self, now: Instant) -> usize {
        self.blocked
            .keys()
            .iter()
            .filter(|ip| self.blocked.remove_if(ip, |_, expires_at| now >= *expires_at))
            .count()
    }

    /// Static deny-list entries plus live automatic blocks.
    pub fn blocked_count(&self, now: Instant) -> usize {
        self.purge_expired(now);
        self.blacklist.len() + self.blocked.len()
    }

    /// Time a static block is reported to last.
    pub fn block_duration(&self) -> Duration {
        self.block_duration
    }
}
