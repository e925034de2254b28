/// A UI component bound to a store.
///
/// On every state change the store walks its mounted subscribers in
/// attachment order and calls, for each one:
///
/// 1. [`will_update_from_store`](Self::will_update_from_store)
/// 2. [`store_will_update`](Self::store_will_update)
/// 3. [`force_update`](Self::force_update)
/// 4. [`store_did_update`](Self::store_did_update)
/// 5. [`did_update_from_store`](Self::did_update_from_store)
///
/// The binding-level hooks wrap the component-level ones.
pub trait Subscriber: Send + Sync {
    /// Unmounted subscribers are skipped.
    fn is_mounted(&self) -> bool;

    /// Re-render.
    fn force_update(&self);

    fn will_update_from_store(&self) {}

    fn did_update_from_store(&self) {}

    fn store_will_update(&self) {}

    fn store_did_update(&self) {}
}

/// Identifies an attached [`Subscriber`] for later detaching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(pub(crate) usize);
