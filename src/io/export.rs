//! CSV export for stored telemetry samples.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::appliances::TelemetrySample;

/// Column header, matching the `appliance_data` column names.
const HEADER: &str = "appliance_id,user_id,is_on,temperature,power_consumption,timestamp";

/// Timestamp layout written to the CSV, identical to the stored text form.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Exports samples to a CSV file at the given path.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_csv(samples: &[TelemetrySample], path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_csv(samples, buf)
}

/// Writes samples as CSV to any writer.
///
/// A missing temperature is written as an empty field.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_csv(samples: &[TelemetrySample], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    wtr.write_record(HEADER.split(','))?;

    for s in samples {
        wtr.write_record(&[
            s.appliance_id.to_string(),
            s.user_id.to_string(),
            s.is_on.to_string(),
            s.temperature.map(|t| format!("{t:.2}")).unwrap_or_default(),
            format!("{:.2}", s.power_consumption),
            s.timestamp.format(TIMESTAMP_FORMAT).to_string(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
