// ── Reactive accessory store ──
//
// Concurrent accessory storage with push-based change notification.

mod collection;

pub(crate) use collection::AccessoryCollection;
