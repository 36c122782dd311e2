//! Process-unique identifiers for scheduling entities.

/// Declare an opaque identifier type backed by its own monotonically increasing counter.
macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u64);

        impl $name {
            /// Get the next identifier in the sequence.
            pub(crate) fn next() -> Self {
                static NEXT: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(1);
                // NOTE: wrapping would take centuries of continuous allocation.
                Self(NEXT.fetch_add(1, std::sync::atomic::Ordering::Relaxed))
            }

            /// The raw value of this identifier.
            pub const fn into_raw(self) -> u64 {
                self.0
            }
        }
    };
}
