use crate::convert::{Converter, ConverterConfig};
use crate::protocol::{Converted, MetricBatch};
use crate::ttl::SweepHandle;

/// A long-lived [`Converter`] whose state is swept in the background.
///
/// This is the unit of ownership for conversion state: it is created once per destination,
/// converts every batch for that destination, and releases all state on
/// [`shutdown`](Self::shutdown).
#[derive(Debug)]
pub struct ConverterService {
    converter: Converter,
    sweepers: Vec<SweepHandle>,
}

impl ConverterService {
    /// Creates the converter and starts sweeping its state.
    ///
    /// Sweepers are only started when called from within a tokio runtime. Outside of a runtime,
    /// expired state is still ignored but only freed when it is overwritten.
    pub fn start(config: ConverterConfig) -> Self {
        let converter = Converter::new(config);

        let sweepers = match tokio::runtime::Handle::try_current() {
            Ok(_) => converter.spawn_sweepers(),
            Err(_) => {
                tally_log::debug!("no runtime available, not sweeping converter state");
                Vec::new()
            }
        };

        tally_log::debug!(sweepers = sweepers.len(), "converter service started");

        Self {
            converter,
            sweepers,
        }
    }

    /// Returns the underlying converter.
    pub fn converter(&self) -> &Converter {
        &self.converter
    }

    /// Converts a batch. See [`Converter::convert`].
    pub fn convert(&self, batch: &MetricBatch) -> Converted {
        self.converter.convert(batch)
    }

    /// Stops all sweepers and drops the conversion state.
    pub async fn shutdown(self) {
        let Self {
            converter,
            sweepers,
        } = self;

        for sweeper in sweepers {
            sweeper.shutdown().await;
        }

        let series = converter.deltas().len() + converter.summaries().len();
        tally_log::debug!(series, "converter service stopped");
    }
}
