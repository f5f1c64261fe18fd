// src/store.rs

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

/// Współdzielony magazyn jednej kolekcji (koszyk albo lista zamówień).
///
/// Wszystkie zapisy przechodzą przez jeden mutex, który nigdy nie jest trzymany
/// przez `.await`, więc każdy optymistyczny krok jest atomowy. Między krokami
/// dwie mutacje mogą się przeplatać: wygrywa ta, która skończy się później.
#[derive(Debug)]
pub struct Store<T> {
    slot: Mutex<Slot<T>>,
    reconciling: Arc<watch::Sender<usize>>,
}

#[derive(Debug)]
struct Slot<T> {
    value: T,
    stale: bool,
}

impl<T: Clone> Store<T> {
    pub fn new(initial: T) -> Self {
        let (reconciling, _) = watch::channel(0);
        Self {
            slot: Mutex::new(Slot {
                value: initial,
                // Nic jeszcze nie zostało pobrane z serwera.
                stale: true,
            }),
            reconciling: Arc::new(reconciling),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Kopia aktualnej wartości (po wartości, nie po referencji).
    pub fn snapshot(&self) -> T {
        self.lock().value.clone()
    }

    /// Podmienia całą wartość na świeżą prawdę z serwera.
    pub fn replace(&self, value: T) {
        let mut slot = self.lock();
        slot.value = value;
        slot.stale = false;
    }

    /// Przywraca migawkę po nieudanej mutacji. Wartość pozostaje do odświeżenia.
    pub fn restore(&self, snapshot: T) {
        let mut slot = self.lock();
        slot.value = snapshot;
        slot.stale = true;
    }

    /// Modyfikacja w miejscu (krok optymistyczny).
    pub fn patch<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut slot = self.lock();
        f(&mut slot.value)
    }

    pub fn invalidate(&self) {
        self.lock().stale = true;
    }

    pub fn is_stale(&self) -> bool {
        self.lock().stale
    }

    /// Oznacza początek uzgadniania. Flaga jest zapalona, dopóki żyje choć jeden strażnik.
    pub fn begin_reconcile(&self) -> ReconcileGuard {
        self.reconciling.send_modify(|pending| *pending += 1);
        ReconcileGuard {
            reconciling: Arc::clone(&self.reconciling),
        }
    }

    pub fn is_reconciling(&self) -> bool {
        *self.reconciling.borrow() > 0
    }

    /// Subskrypcja liczby trwających uzgodnień (dla interfejsu).
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.reconciling.subscribe()
    }
}

#[derive(Debug)]
pub struct ReconcileGuard {
    reconciling: Arc<watch::Sender<usize>>,
}

impl Drop for ReconcileGuard {
    fn drop(&mut self) {
        self.reconciling
            .send_modify(|pending| *pending = pending.saturating_sub(1));
    }
}
