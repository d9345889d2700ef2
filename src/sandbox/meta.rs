//! Isolate meta file parser
//!
//! The meta file is a list of `key:value` lines written by isolate after a run.

/// Raw execution status from isolate
#[derive(Debug, Clone, PartialEq)]
pub enum IsolateStatus {
    /// Program exited normally
    Ok,
    /// Time limit (CPU or wall) exceeded
    TimeOut,
    /// Killed by signal
    Signal(i32),
    /// Non-zero exit
    RuntimeError,
    /// Internal error in isolate
    InternalError,
}

/// Parsed isolate meta file contents
#[derive(Debug, Clone)]
pub struct IsolateMeta {
    /// CPU time used in milliseconds
    pub time_ms: u32,
    /// Wall clock time in milliseconds
    pub wall_time_ms: u32,
    /// Memory used in KB (largest of cg-mem and max-rss)
    pub memory_kb: u32,
    /// Exit code of the process
    pub exit_code: i32,
    /// Whether isolate had to kill the program
    pub killed: bool,
    /// Human readable status message
    pub message: Option<String>,
    /// Isolate status
    pub status: IsolateStatus,
}

impl Default for IsolateMeta {
    fn default() -> Self {
        Self {
            time_ms: 0,
            wall_time_ms: 0,
            memory_kb: 0,
            exit_code: 0,
            killed: false,
            message: None,
            status: IsolateStatus::Ok,
        }
    }
}

fn seconds_to_ms(value: &str) -> Option<u32> {
    value.parse::<f64>().ok().map(|t| (t * 1000.0) as u32)
}

/// Parse isolate meta file content
pub fn parse_meta(content: &str) -> IsolateMeta {
    let mut meta = IsolateMeta::default();
    let mut status_code = "";
    let mut exit_signal = None;

    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();

        match key.trim() {
            "time" => meta.time_ms = seconds_to_ms(value).unwrap_or(meta.time_ms),
            "time-wall" => meta.wall_time_ms = seconds_to_ms(value).unwrap_or(meta.wall_time_ms),
            "cg-mem" | "max-rss" => {
                if let Ok(kb) = value.parse::<u32>() {
                    meta.memory_kb = meta.memory_kb.max(kb);
                }
            }
            "exitcode" => meta.exit_code = value.parse().unwrap_or(0),
            "exitsig" => exit_signal = value.parse::<i32>().ok(),
            "killed" => meta.killed = value == "1",
            "message" => meta.message = Some(value.to_string()),
            "status" => status_code = value,
            _ => {}
        }
    }

    meta.status = match (status_code, exit_signal) {
        ("TO", _) => IsolateStatus::TimeOut,
        ("XX", _) => IsolateStatus::InternalError,
        (_, Some(sig)) => IsolateStatus::Signal(sig),
        ("SG", None) => IsolateStatus::Signal(0),
        ("", None) if meta.exit_code == 0 => IsolateStatus::Ok,
        _ => IsolateStatus::RuntimeError,
    };

    meta
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_meta_success() {
        let content = "time:0.015\ntime-wall:0.020\nmax-rss:900\ncg-mem:1024\nexitcode:0\n";
        let meta = parse_meta(content);

        assert_eq!(meta.time_ms, 15);
        assert_eq!(meta.wall_time_ms, 20);
        assert_eq!(meta.memory_kb, 1024);
        assert_eq!(meta.status, IsolateStatus::Ok);
    }

    #[test]
    fn test_parse_meta_wall_timeout() {
        let content = "time:0.100\ntime-wall:2.001\nkilled:1\nstatus:TO\nmessage:Time limit exceeded (wall clock)\n";
        let meta = parse_meta(content);

        assert_eq!(meta.status, IsolateStatus::TimeOut);
        assert!(meta.killed);
        assert_eq!(
            meta.message.as_deref(),
            Some("Time limit exceeded (wall clock)")
        );
    }

    #[test]
    fn test_parse_meta_signal_and_exit() {
        assert_eq!(
            parse_meta("status:SG\nexitsig:25\n").status,
            IsolateStatus::Signal(25)
        );
        assert_eq!(
            parse_meta("status:RE\nexitcode:1\n").status,
            IsolateStatus::RuntimeError
        );
        assert_eq!(parse_meta("status:XX\n").status, IsolateStatus::InternalError);
    }
}
