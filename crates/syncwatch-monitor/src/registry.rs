//! Subscriber bookkeeping
//!
//! [`SubscriberRegistry`] maps each [`WatchedResource`] to the subscriptions
//! interested in it. Insertions and removals report occupancy transitions
//! (empty → non-empty and back) so the owner can start the underlying watch
//! on the first subscriber and stop it after the last one. The registry is a
//! plain data structure; [`GlobalProgressMonitor`](crate::GlobalProgressMonitor)
//! keeps it behind its state mutex together with the live watch, so a
//! transition and the matching start/stop happen atomically.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use syncwatch_core::domain::{MatchPolicy, SubscriptionId, WatchedResource};

use crate::ProgressCallback;

// ============================================================================
// Subscription
// ============================================================================

/// One subscriber's interest in a resource
#[derive(Clone)]
pub struct Subscription {
    /// Unique token handed back to the subscriber
    pub id: SubscriptionId,
    /// The resource the subscriber cares about
    pub resource: WatchedResource,
    /// Minimum time between two throttled deliveries
    pub min_interval: Duration,
    callback: ProgressCallback,
    active: Arc<AtomicBool>,
}

impl Subscription {
    /// Creates an active subscription with a fresh id
    pub fn new(resource: WatchedResource, min_interval: Duration, callback: ProgressCallback) -> Self {
        Self {
            id: SubscriptionId::new(),
            resource,
            min_interval,
            callback,
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Invokes the callback if the subscription has not been removed
    ///
    /// Returns whether the callback ran.
    pub fn notify(&self, progress: f64) -> bool {
        if !self.is_active() {
            return false;
        }
        (self.callback)(progress);
        true
    }

    /// Returns false once the subscription has been removed from its registry
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("resource", &self.resource)
            .field("min_interval", &self.min_interval)
            .field("active", &self.is_active())
            .finish()
    }
}

// ============================================================================
// Removal
// ============================================================================

/// Outcome of removing a subscription
#[derive(Debug)]
pub struct Removal {
    /// The removed (and now inactive) subscription
    pub subscription: Subscription,
    /// The resource has no subscribers left
    pub resource_emptied: bool,
    /// The whole registry has no subscribers left
    pub registry_emptied: bool,
}

// ============================================================================
// SubscriberRegistry
// ============================================================================

/// Mapping from watched resource to its subscriptions
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    by_resource: HashMap<WatchedResource, Vec<Subscription>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscription
    ///
    /// Returns true if the registry was empty before the insertion, i.e. the
    /// underlying watch has to be started.
    pub fn insert(&mut self, subscription: Subscription) -> bool {
        let was_empty = self.is_empty();
        self.by_resource
            .entry(subscription.resource.clone())
            .or_default()
            .push(subscription);
        was_empty
    }

    /// Removes the subscription `id` registered for `resource`
    ///
    /// Returns `None` when no such subscription exists, which makes repeated
    /// removals harmless. The removed subscription is deactivated so a
    /// callback captured before the removal no longer fires.
    pub fn remove(&mut self, resource: &WatchedResource, id: SubscriptionId) -> Option<Removal> {
        let subscriptions = self.by_resource.get_mut(resource)?;
        let index = subscriptions.iter().position(|s| s.id == id)?;
        let subscription = subscriptions.remove(index);
        subscription.deactivate();

        let resource_emptied = subscriptions.is_empty();
        if resource_emptied {
            self.by_resource.remove(resource);
        }

        Some(Removal {
            subscription,
            resource_emptied,
            registry_emptied: self.is_empty(),
        })
    }

    /// Removes every subscription, deactivating each one
    pub fn drain(&mut self) -> Vec<Subscription> {
        let drained: Vec<Subscription> = self
            .by_resource
            .drain()
            .flat_map(|(_, subs)| subs)
            .collect();
        for subscription in &drained {
            subscription.deactivate();
        }
        drained
    }

    /// Subscriptions whose resource refers to an item reported at `path`
    pub fn matching<'a>(
        &'a self,
        path: &'a Path,
        policy: MatchPolicy,
    ) -> impl Iterator<Item = &'a Subscription> + 'a {
        self.by_resource
            .iter()
            .filter(move |(resource, _)| resource.matches(path, policy))
            .flat_map(|(_, subs)| subs.iter())
    }

    /// Subscriptions registered for exactly `resource`
    pub fn for_resource(&self, resource: &WatchedResource) -> &[Subscription] {
        self.by_resource
            .get(resource)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Returns true if `id` is registered under `resource`
    pub fn contains(&self, resource: &WatchedResource, id: SubscriptionId) -> bool {
        self.for_resource(resource).iter().any(|s| s.id == id)
    }

    /// Number of distinct resources with at least one subscriber
    pub fn resource_count(&self) -> usize {
        self.by_resource.len()
    }

    /// Total number of subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.by_resource.values().map(Vec::len).sum()
    }

    /// Returns true if nobody is subscribed
    pub fn is_empty(&self) -> bool {
        self.by_resource.is_empty()
    }
}
