//! Download progress throttling.

/// Receives percentage updates from a [`ProgressReporter`].
pub trait ProgressSink: Send {
    fn emit(&mut self, percent: u8);
}

impl<F> ProgressSink for F
where
    F: FnMut(u8) + Send,
{
    fn emit(&mut self, percent: u8) {
        self(percent)
    }
}

/// Turns raw byte counts into whole percentages and forwards only the
/// ones that differ from the last value forwarded.
///
/// One reporter belongs to one download; the last emitted value is never
/// shared between transfers.
pub struct ProgressReporter<'a> {
    sink: Box<dyn ProgressSink + 'a>,
    last: Option<u8>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(sink: impl ProgressSink + 'a) -> Self {
        Self {
            sink: Box::new(sink),
            last: None,
        }
    }

    /// Record that `downloaded` of `total` bytes have arrived.
    ///
    /// A `total` of zero means the size is unknown and reports 0%.
    pub fn update(&mut self, downloaded: u64, total: u64) {
        let percent = percent_of(downloaded, total);
        if self.last != Some(percent) {
            self.last = Some(percent);
            self.sink.emit(percent);
        }
    }

    /// The last percentage forwarded to the sink, if any.
    pub fn last(&self) -> Option<u8> {
        self.last
    }
}

fn percent_of(downloaded: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let percent = (downloaded as u128 * 100) / total as u128;
    percent.min(100) as u8
}
