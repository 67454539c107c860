use super::csv::split_csv_line;
use super::types::StartupEntry;

/// Arguments for the verbose CSV task listing
pub const SCHTASKS_ARGS: [&str; 4] = ["/Query", "/FO", "CSV", "/V"];

const TRIGGERS: [&str; 4] = ["at logon", "at log on", "at startup", "at system start up"];

/// Column positions of the fields read from the listing
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TaskColumns {
    pub name: usize,
    pub schedule: usize,
    pub command: usize,
}

/// Layout of `schtasks /Query /FO CSV /V` on an English system
pub const VERBOSE_LAYOUT: TaskColumns = TaskColumns {
    name: 1,
    schedule: 18,
    command: 8,
};

impl TaskColumns {
    /// Locate the columns by header name, keeping the default position for any
    /// header that isn't found (localized systems)
    fn from_header(header: &[String], fallback: TaskColumns) -> Self {
        let find = |label: &str, default: usize| {
            header
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(label))
                .unwrap_or(default)
        };
        Self {
            name: find("TaskName", fallback.name),
            schedule: find("Schedule Type", fallback.schedule),
            command: find("Task To Run", fallback.command),
        }
    }
}

/// Whether a schedule description fires at logon or boot
pub fn is_startup_trigger(schedule: &str) -> bool {
    let lower = schedule.to_lowercase();
    TRIGGERS.iter().any(|t| lower.contains(t))
}

/// Parse the listing, keeping tasks triggered at logon or startup.
/// The first non-empty line is the header; repeats of it are skipped too.
pub fn parse_task_listing(output: &str) -> Vec<StartupEntry> {
    let mut lines = output.lines().filter(|l| !l.trim().is_empty());
    let header = match lines.next() {
        Some(line) => split_csv_line(line),
        None => return Vec::new(),
    };
    let columns = TaskColumns::from_header(&header, VERBOSE_LAYOUT);
    let header_first = header.first().map(|h| h.trim().to_string()).unwrap_or_default();

    let mut entries = Vec::new();
    for line in lines {
        let fields = split_csv_line(line);
        if fields.first().map(|f| f.trim()) == Some(header_first.as_str()) {
            continue;
        }

        let (Some(name), Some(schedule)) = (fields.get(columns.name), fields.get(columns.schedule))
        else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() || !is_startup_trigger(schedule) {
            continue;
        }

        let command = fields
            .get(columns.command)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        entries.push(StartupEntry::scheduled_job(name, command));
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::startup::types::StartupSource;

    const HEADER: &str = r#""HostName","TaskName","Next Run Time","Status","Logon Mode","Last Run Time","Last Result","Author","Task To Run","Start In","Comment","Scheduled Task State","Idle Time","Power Management","Run As User","Delete Task If Not Rescheduled","Stop Task If Runs X Hours and X Mins","Schedule","Schedule Type""#;

    fn row(name: &str, command: &str, schedule_type: &str) -> String {
        format!(
            r#""PC","{}","N/A","Ready","Interactive","N/A","0","Vendor","{}","N/A","N/A","Enabled","Disabled","","User","Disabled","72:00:00","Scheduling data is not available in this format.","{}""#,
            name, command, schedule_type
        )
    }

    #[test]
    fn test_keeps_logon_and_startup_tasks() {
        let output = [
            HEADER.to_string(),
            row(r"\Vendor\Updater", r"C:\Vendor\update.exe /silent", "At logon time"),
            row(r"\Backup", r"C:\backup.exe", "Daily"),
            row(r"\Agent", r"C:\agent.exe", "At system start up"),
        ]
        .join("\r\n");

        let entries = parse_task_listing(&output);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, r"\Vendor\Updater");
        assert_eq!(entries[0].command.as_deref(), Some(r"C:\Vendor\update.exe /silent"));
        assert_eq!(entries[0].source, StartupSource::ScheduledJob);
        assert!(entries[0].remediation_handle.is_none());
        assert_eq!(entries[1].name, r"\Agent");
    }

    #[test]
    fn test_repeated_headers_and_blank_lines_are_skipped() {
        let output = [
            HEADER.to_string(),
            String::new(),
            HEADER.to_string(),
            row(r"\Sync, Nightly", "sync.exe", "AT LOG ON"),
        ]
        .join("\n");

        let entries = parse_task_listing(&output);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, r"\Sync, Nightly");
    }

    #[test]
    fn test_short_rows_are_ignored() {
        let output = format!("{}\n\"PC\",\"Task\"\n", HEADER);
        assert!(parse_task_listing(&output).is_empty());
        assert!(parse_task_listing("").is_empty());
    }

    #[test]
    fn test_unknown_header_falls_back_to_positions() {
        let mut fields = vec![String::from("x"); 19];
        fields[1] = "Aufgabe".to_string();
        fields[18] = "At startup".to_string();
        let data = fields.iter().map(|f| format!("\"{}\"", f)).collect::<Vec<_>>().join(",");
        let header = (0..19).map(|i| format!("\"h{}\"", i)).collect::<Vec<_>>().join(",");

        let entries = parse_task_listing(&format!("{}\n{}", header, data));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "Aufgabe");
    }

    #[test]
    fn test_trigger_matching() {
        assert!(is_startup_trigger("At logon time"));
        assert!(is_startup_trigger("at startup"));
        assert!(!is_startup_trigger("One Time Only"));
    }
}
