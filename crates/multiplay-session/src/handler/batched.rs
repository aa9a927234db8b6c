use multiplay_cache::{HistoryConfig, PushOutcome, TickHistory};
use multiplay_protocol::messages::TickBatch;
use multiplay_protocol::{BitReader, BitWriter, ProtocolError, Tick, WireFormat};

/// Shared plumbing of handlers whose body is a [`TickBatch`]: an outgoing
/// queue, a tick-ordered incoming history, and a list of applied events
/// waiting for the simulation to pick them up.
#[derive(Debug, Clone)]
pub struct BatchedEvents<T> {
    outgoing: Vec<T>,
    incoming: TickHistory<T>,
    applied: Vec<(Tick, T)>,
}

impl<T> Default for BatchedEvents<T> {
    fn default() -> Self {
        Self::new(HistoryConfig::default())
    }
}

impl<T> BatchedEvents<T> {
    pub fn new(history: HistoryConfig) -> Self {
        Self {
            outgoing: Vec::new(),
            incoming: TickHistory::new(history),
            applied: Vec::new(),
        }
    }

    pub fn queue(&mut self, item: T) {
        self.outgoing.push(item);
    }

    /// Events queued for the next gather.
    pub fn pending(&self) -> usize {
        self.outgoing.len()
    }

    /// Received events whose tick has not arrived yet.
    pub fn waiting(&self) -> usize {
        self.incoming.len()
    }

    /// Buffers every item of `batch`. Returns how many were kept.
    pub fn buffer(&mut self, batch: TickBatch<T>) -> usize {
        let tick = batch.tick;
        let mut kept = 0;
        for item in batch.items {
            match self.incoming.push(tick, item) {
                PushOutcome::Buffered => kept += 1,
                outcome => tracing::warn!(%tick, ?outcome, "handler event dropped"),
            }
        }
        kept
    }

    pub fn apply(&mut self, tick: Tick) {
        self.applied.extend(self.incoming.drain_ready(tick));
    }

    /// Takes the events applied so far, in tick order.
    pub fn drain_applied(&mut self) -> Vec<(Tick, T)> {
        std::mem::take(&mut self.applied)
    }

    pub fn clear(&mut self) {
        self.outgoing.clear();
        self.incoming.clear();
        self.applied.clear();
    }
}

impl<T: WireFormat> BatchedEvents<T> {
    /// Writes the queued events as one batch for `tick`.
    pub fn write(&mut self, tick: Tick, writer: &mut BitWriter) -> bool {
        if self.outgoing.is_empty() {
            return false;
        }
        let batch = TickBatch {
            tick,
            items: std::mem::take(&mut self.outgoing),
        };
        batch.write(writer);
        true
    }

    /// Reads one batch and checks it used exactly `size` bits.
    pub fn read(reader: &mut BitReader<'_>, size: u32) -> Result<TickBatch<T>, ProtocolError> {
        let start = reader.position();
        let batch = TickBatch::read(reader)?;
        let used = reader.position() - start;
        if used != size {
            return Err(ProtocolError::InvalidValue(format!(
                "handler body declared {size} bits, batch used {used}"
            )));
        }
        Ok(batch)
    }
}
