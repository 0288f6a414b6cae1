use anyhow::Result;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Mutex;
use crate::execution::types::AttemptRecord;

/// Append-only CSV log of handler attempts for operators.
pub struct CsvLogger {
    log_path: String,
    // serializes appends from concurrently running handlers
    write_lock: Mutex<()>,
}

impl CsvLogger {
    pub fn new(log_path: String) -> Result<Self> {
        // Create CSV file with headers if it doesn't exist
        if !std::path::Path::new(&log_path).exists() {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .open(&log_path)?;

            writeln!(
                file,
                "timestamp,market_id,trigger,outcome,confidence,admitted,error"
            )?;
        }

        Ok(Self {
            log_path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn log_attempt(&self, attempt: &AttemptRecord) -> Result<()> {
        let _lock = self.write_lock.lock().map_err(|_| anyhow::anyhow!("CSV log lock poisoned"))?;
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.log_path)?;

        let outcome_str = attempt.outcome.map(|o| o.label()).unwrap_or("");
        let confidence_str = match attempt.confidence {
            Some(c) => format!("{:.3}", c),
            None => String::new(),
        };
        let error_str = attempt
            .error
            .as_deref()
            .map(|e| format!("\"{}\"", e.replace('"', "'").replace(['\r', '\n'], " ")))
            .unwrap_or_default();

        writeln!(
            file,
            "{},{},{},{},{},{},{}",
            attempt.attempted_at.to_rfc3339(),
            attempt.market_id,
            attempt.trigger,
            outcome_str,
            confidence_str,
            attempt.admitted,
            error_str
        )?;

        Ok(())
    }
}
