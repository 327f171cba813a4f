/*!
# CSV chain output

[`CsvSink`] streams chain records to CSV, one row per saved step. The header
is written on the first record, once the dimensionality is known:
`step,log_likelihood,accepted`, then `dim_0..dim_{d-1}` for the accepted
point and `step_0..step_{d-1}` for the trial step. Enable via the `csv`
feature (on by default).
*/

use std::error::Error;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use csv::Writer;

use crate::core::{ChainSink, StepRecord};

/// A [`ChainSink`] writing one CSV row per record.
///
/// The sink trait is infallible, so I/O errors are buffered internally: the
/// first error stops further output and is returned by
/// [`finish`](CsvSink::finish).
pub struct CsvSink<W: Write> {
    writer: Writer<W>,
    steps: u64,
    wrote_header: bool,
    error: Option<csv::Error>,
}

impl CsvSink<File> {
    /// Creates a sink writing to a fresh file at `path`.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn Error>> {
        Ok(Self::from_writer(File::create(path)?))
    }
}

impl<W: Write> CsvSink<W> {
    pub fn from_writer(writer: W) -> Self {
        CsvSink {
            writer: Writer::from_writer(writer),
            steps: 0,
            wrote_header: false,
            error: None,
        }
    }

    /// Flushes the output and reports the first error hit while recording,
    /// if any.
    pub fn finish(mut self) -> Result<(), Box<dyn Error>> {
        if let Some(err) = self.error.take() {
            return Err(err.into());
        }
        self.writer.flush()?;
        Ok(())
    }

    fn write_record(&mut self, record: &StepRecord<'_>) -> Result<(), csv::Error> {
        if !self.wrote_header {
            let mut header = vec![
                "step".to_string(),
                "log_likelihood".to_string(),
                "accepted".to_string(),
            ];
            header.extend((0..record.point.len()).map(|i| format!("dim_{}", i)));
            header.extend((0..record.trial_step.len()).map(|i| format!("step_{}", i)));
            self.writer.write_record(&header)?;
            self.wrote_header = true;
        }

        let mut row = vec![
            self.steps.to_string(),
            record.log_likelihood.to_string(),
            record.accepted.to_string(),
        ];
        row.extend(record.point.iter().map(|v| v.to_string()));
        row.extend(record.trial_step.iter().map(|v| v.to_string()));
        self.writer.write_record(&row)
    }
}

impl<W: Write> ChainSink for CsvSink<W> {
    fn record(&mut self, record: &StepRecord<'_>) {
        if self.error.is_some() {
            return;
        }
        if let Err(err) = self.write_record(record) {
            self.error = Some(err);
        }
        self.steps += 1;
    }
}
