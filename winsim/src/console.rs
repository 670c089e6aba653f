use std::fmt;

use tracing::info;

/// `fmt::Write` sink that turns every completed line into a `status` event.
#[derive(Debug, Default)]
pub struct TraceWriter {
    line: String,
}

impl fmt::Write for TraceWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for chunk in s.split_inclusive('\n') {
            match chunk.strip_suffix('\n') {
                Some(rest) => {
                    self.line.push_str(rest);
                    self.flush_line();
                }
                None => self.line.push_str(chunk),
            }
        }
        Ok(())
    }
}

impl TraceWriter {
    fn flush_line(&mut self) {
        let line = self.line.trim_end_matches('\r');
        if !line.is_empty() {
            info!(target: "status", "{}", line);
        }
        self.line.clear();
    }
}

impl Drop for TraceWriter {
    fn drop(&mut self) {
        if !self.line.is_empty() {
            self.flush_line();
        }
    }
}
