use super::{
    bytes_to_mb, extract_account, CollectorError, Enumeration, ProcessCollector, ProcessRecord,
    SkippedProcess,
};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Fields of `/proc/<pid>/stat` the collector cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StatFields {
    pub name: String,
    pub state: char,
    pub start_time_ticks: u64,
    pub rss_pages: u64,
}

/// Parses a stat line. The command name is wrapped in parentheses and may
/// itself contain spaces or parentheses, so the split happens at the last `)`.
pub(crate) fn parse_stat(content: &str) -> Option<StatFields> {
    let open = content.find('(')?;
    let close = content.rfind(')')?;
    if close <= open {
        return None;
    }
    let name = content[open + 1..close].to_string();
    let rest: Vec<&str> = content[close + 1..].split_whitespace().collect();
    // rest[0] is field 3 (state); starttime is field 22, rss field 24.
    if rest.len() < 22 {
        return None;
    }
    Some(StatFields {
        name,
        state: rest[0].chars().next().unwrap_or('?'),
        start_time_ticks: rest[19].parse().ok()?,
        rss_pages: rest[21].parse().ok()?,
    })
}

pub struct LinuxProcessCollector {
    proc_root: PathBuf,
    page_size: u64,
    clock_ticks: u64,
    boot_time: u64,
}

impl LinuxProcessCollector {
    pub fn new() -> Self {
        Self::with_root("/proc")
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let proc_root = root.into();
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) as u64 };
        let clock_ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) as u64 }.max(1);
        let boot_time = Self::get_boot_time(&proc_root);
        Self {
            proc_root,
            page_size,
            clock_ticks,
            boot_time,
        }
    }

    fn get_boot_time(root: &Path) -> u64 {
        let stat = fs::read_to_string(root.join("stat")).unwrap_or_default();
        stat.lines()
            .find_map(|line| line.strip_prefix("btime "))
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    fn read_stat(&self, pid: u32) -> Result<StatFields, CollectorError> {
        let path = self.proc_root.join(pid.to_string()).join("stat");
        let content = fs::read_to_string(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => CollectorError::Vanished { pid },
            _ => CollectorError::Read { pid, source: e },
        })?;
        parse_stat(&content).ok_or(CollectorError::MalformedStat { pid })
    }

    fn build_record(&self, pid: u32, stat: StatFields) -> ProcessRecord {
        let memory_mb = bytes_to_mb(stat.rss_pages.saturating_mul(self.page_size));
        let start_time = self.boot_time + stat.start_time_ticks / self.clock_ticks;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let age_minutes = now.saturating_sub(start_time) / 60;
        let command_line = self.command_line(pid);
        let account = command_line.as_deref().and_then(extract_account);
        ProcessRecord {
            pid,
            name: stat.name,
            memory_mb,
            age_minutes,
            command_line,
            account,
        }
    }
}

impl Default for LinuxProcessCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessCollector for LinuxProcessCollector {
    fn list(&self, name: &str) -> Result<Enumeration, CollectorError> {
        let entries = fs::read_dir(&self.proc_root).map_err(CollectorError::Enumerate)?;
        let mut enumeration = Enumeration::default();
        for entry in entries.flatten() {
            let Some(pid) = entry.file_name().to_str().and_then(|n| n.parse::<u32>().ok()) else {
                continue;
            };
            match self.read_stat(pid) {
                Ok(stat) if stat.name == name => {
                    enumeration.records.push(self.build_record(pid, stat));
                }
                Ok(_) => {}
                // Only name matches are worth reporting as skipped; anything
                // else that vanished was never part of the fleet.
                Err(error) => {
                    if self.comm_matches(pid, name) {
                        enumeration.skipped.push(SkippedProcess { pid, error });
                    }
                }
            }
        }
        enumeration.records.sort_by_key(|r| r.pid);
        enumeration.skipped.sort_by_key(|s| s.pid);
        Ok(enumeration)
    }

    fn command_line(&self, pid: u32) -> Option<String> {
        let raw = fs::read(self.proc_root.join(pid.to_string()).join("cmdline")).ok()?;
        let joined = String::from_utf8_lossy(&raw).replace('\0', " ");
        let trimmed = joined.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

impl LinuxProcessCollector {
    fn comm_matches(&self, pid: u32, name: &str) -> bool {
        fs::read_to_string(self.proc_root.join(pid.to_string()).join("comm"))
            .map(|comm| comm.trim_end() == name)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_name_with_spaces_and_parens() {
        let line = "4242 (Web (Content) x) S 1 4242 4242 0 -1 4194560 1 0 0 0 7 3 0 0 20 0 1 0 987654 1000 256 18446744073709551615";
        let stat = parse_stat(line).unwrap();
        assert_eq!(stat.name, "Web (Content) x");
        assert_eq!(stat.state, 'S');
        assert_eq!(stat.start_time_ticks, 987654);
        assert_eq!(stat.rss_pages, 256);
    }

    #[test]
    fn rejects_truncated_stat() {
        assert!(parse_stat("12 (zbe1) S 1 2 3").is_none());
        assert!(parse_stat("garbage").is_none());
    }
}
