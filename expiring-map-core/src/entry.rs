use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

/// Callback invoked with the entry's value when the entry expires
pub type ExpiryCallback<V> = Box<dyn FnOnce(&V) + Send + Sync + 'static>;

/// Boxes a closure as an [`ExpiryCallback`]
///
/// ```rust
/// use expiring_map_core::{on_expire, ExpiryCallback};
///
/// let cb: ExpiryCallback<u32> = on_expire(|v: &u32| println!("{v} expired"));
/// ```
pub fn on_expire<V, F>(f: F) -> ExpiryCallback<V>
where
    F: FnOnce(&V) + Send + Sync + 'static,
{
    Box::new(f)
}

/// Represents a stored value with its expiration time and expiry callbacks
pub(crate) struct Entry<V> {
    value: V,
    expires_at: Instant,
    on_expire: Vec<ExpiryCallback<V>>,
}

impl<V> Entry<V> {
    /// Creates a new entry with the given value, expiration time and callbacks
    pub(crate) fn new(value: V, expires_at: Instant, on_expire: Vec<ExpiryCallback<V>>) -> Self {
        Self {
            value,
            expires_at,
            on_expire,
        }
    }

    /// Returns the stored value
    pub(crate) fn value(&self) -> &V {
        &self.value
    }

    /// Returns the expiration time
    pub(crate) fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Checks if this entry has expired
    pub(crate) fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Checks if this entry had expired at `now`
    pub(crate) fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    /// Pushes the deadline back by `extension`.
    ///
    /// Saturates at the cap used for oversized TTLs instead of overflowing.
    pub(crate) fn extend(&mut self, extension: Duration) {
        self.expires_at = saturating_deadline(self.expires_at, extension);
    }

    #[cfg(test)]
    pub(crate) fn callback_count(&self) -> usize {
        self.on_expire.len()
    }

    /// Consumes the entry and runs its callbacks in registration order.
    ///
    /// Each callback is isolated: a panicking callback is logged and the
    /// remaining ones still run. Must not be called while a map lock is held.
    pub(crate) fn expire(self) {
        let Entry {
            value, on_expire, ..
        } = self;

        for (index, callback) in on_expire.into_iter().enumerate() {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(&value))) {
                tracing::error!(
                    callback = index,
                    panic = panic_message(payload.as_ref()),
                    "expiry callback panicked"
                );
            }
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for Entry<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("value", &self.value)
            .field("expires_at", &self.expires_at)
            .field("callbacks", &self.on_expire.len())
            .finish()
    }
}

/// Cap for deadlines (~100 years) so that adding a huge TTL never overflows `Instant`.
pub(crate) const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// `base + ttl`, capped at `base + MAX_TTL`
pub(crate) fn saturating_deadline(base: Instant, ttl: Duration) -> Instant {
    let ttl = ttl.min(MAX_TTL);
    base.checked_add(ttl).unwrap_or(base)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_entry_not_expired() {
        let entry = Entry::new(
            "test_value",
            Instant::now() + Duration::from_secs(60),
            Vec::new(),
        );

        assert_eq!(*entry.value(), "test_value");
        assert!(!entry.is_expired());
    }

    #[test]
    fn test_entry_expired() {
        let entry = Entry::new(1u8, Instant::now() - Duration::from_secs(1), Vec::new());

        assert!(entry.is_expired());
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let deadline = Instant::now();
        let entry = Entry::new((), deadline, Vec::new());

        assert!(entry.is_expired_at(deadline));
        assert!(!entry.is_expired_at(deadline - Duration::from_millis(1)));
    }

    #[test]
    fn test_extend_is_additive() {
        let deadline = Instant::now() + Duration::from_secs(1);
        let mut entry = Entry::new((), deadline, Vec::new());

        entry.extend(Duration::from_secs(2));

        assert_eq!(entry.expires_at(), deadline + Duration::from_secs(2));
    }

    #[test]
    fn test_extend_huge_duration_does_not_panic() {
        let mut entry = Entry::new((), Instant::now(), Vec::new());
        entry.extend(Duration::MAX);
        assert!(!entry.is_expired());
    }

    #[test]
    fn test_callbacks_fire_in_registration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let callbacks = (0..3)
            .map(|i| {
                let order = Arc::clone(&order);
                on_expire(move |v: &u32| order.lock().unwrap().push((i, *v)))
            })
            .collect();

        let entry = Entry::new(7u32, Instant::now(), callbacks);
        assert_eq!(entry.callback_count(), 3);
        entry.expire();

        assert_eq!(*order.lock().unwrap(), vec![(0, 7), (1, 7), (2, 7)]);
    }

    #[test]
    fn test_panicking_callback_is_isolated() {
        let fired = Arc::new(AtomicUsize::new(0));
        let after = Arc::clone(&fired);

        let entry = Entry::new(
            String::from("v"),
            Instant::now(),
            vec![
                on_expire(|_: &String| panic!("boom")),
                on_expire(move |_: &String| {
                    after.fetch_add(1, Ordering::SeqCst);
                }),
            ],
        );
        entry.expire();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropping_entry_does_not_fire_callbacks() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let entry = Entry::new(
            0,
            Instant::now(),
            vec![on_expire(move |_: &i32| {
                counter.fetch_add(1, Ordering::SeqCst);
            })],
        );

        drop(entry);

        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
