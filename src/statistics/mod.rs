use std::sync::atomic::{AtomicU64, Ordering};

/// Per-handle statistics
///
/// Thread-safe counters for the work a `TableHandle` pushes through its
/// table service. Uses atomic counters for lock-free updates.
#[derive(Debug, Default)]
pub struct Statistics {
    // Writes
    pub rows_appended: AtomicU64,
    pub parts_uploaded: AtomicU64,
    pub rows_uploaded: AtomicU64,
    pub rows_discarded: AtomicU64,

    // Reads
    pub rows_read: AtomicU64,
    pub pages_fetched: AtomicU64,

    // Service calls
    pub service_calls: AtomicU64,
    pub close_polls: AtomicU64,

    // Error counts
    pub num_errors: AtomicU64,
}

impl Statistics {
    pub fn new() -> Self {
        Statistics::default()
    }

    #[inline]
    pub fn record_append(&self, rows: u64) {
        self.rows_appended.fetch_add(rows, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_part_upload(&self, rows: u64) {
        self.parts_uploaded.fetch_add(1, Ordering::Relaxed);
        self.rows_uploaded.fetch_add(rows, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_discard(&self, rows: u64) {
        self.rows_discarded.fetch_add(rows, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_page(&self, rows: u64) {
        self.pages_fetched.fetch_add(1, Ordering::Relaxed);
        self.rows_read.fetch_add(rows, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_service_call(&self) {
        self.service_calls.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_close_poll(&self) {
        self.close_polls.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_error(&self) {
        self.num_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rows_appended(&self) -> u64 {
        self.rows_appended.load(Ordering::Relaxed)
    }

    pub fn parts_uploaded(&self) -> u64 {
        self.parts_uploaded.load(Ordering::Relaxed)
    }

    pub fn rows_uploaded(&self) -> u64 {
        self.rows_uploaded.load(Ordering::Relaxed)
    }

    pub fn rows_read(&self) -> u64 {
        self.rows_read.load(Ordering::Relaxed)
    }

    pub fn service_calls(&self) -> u64 {
        self.service_calls.load(Ordering::Relaxed)
    }

    pub fn num_errors(&self) -> u64 {
        self.num_errors.load(Ordering::Relaxed)
    }

    /// Average rows per uploaded part, 0 when nothing was uploaded
    pub fn avg_rows_per_part(&self) -> f64 {
        let parts = self.parts_uploaded();
        if parts == 0 {
            return 0.0;
        }
        self.rows_uploaded() as f64 / parts as f64
    }

    pub fn reset(&self) {
        self.rows_appended.store(0, Ordering::Relaxed);
        self.parts_uploaded.store(0, Ordering::Relaxed);
        self.rows_uploaded.store(0, Ordering::Relaxed);
        self.rows_discarded.store(0, Ordering::Relaxed);
        self.rows_read.store(0, Ordering::Relaxed);
        self.pages_fetched.store(0, Ordering::Relaxed);
        self.service_calls.store(0, Ordering::Relaxed);
        self.close_polls.store(0, Ordering::Relaxed);
        self.num_errors.store(0, Ordering::Relaxed);
    }

    pub fn report(&self) -> String {
        format!(
            "Table Statistics:\n\
            \n\
            Writes:\n\
            - Rows appended: {}\n\
            - Parts:         {}\n\
            - Rows uploaded: {}\n\
            - Rows/part:     {:.2}\n\
            - Discarded:     {}\n\
            \n\
            Reads:\n\
            - Rows read:     {}\n\
            - Pages:         {}\n\
            \n\
            Service:\n\
            - Calls:         {}\n\
            - Close polls:   {}\n\
            \n\
            Errors:          {}",
            self.rows_appended(),
            self.parts_uploaded(),
            self.rows_uploaded(),
            self.avg_rows_per_part(),
            self.rows_discarded.load(Ordering::Relaxed),
            self.rows_read(),
            self.pages_fetched.load(Ordering::Relaxed),
            self.service_calls(),
            self.close_polls.load(Ordering::Relaxed),
            self.num_errors(),
        )
    }
}
