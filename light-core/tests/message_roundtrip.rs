//! Formatted messages through a file backend and back

use std::sync::Arc;
use std::time::Duration;

use light_core::message::DEFAULT_MESSAGE;
use light_core::{
    format_message, ConfigDocument, FileIo, FileSourceOptions, HarnessConfig, LineReader, LogMessageFields,
    MessageFormat, MessageGenerator, PollConfig, Poller, ResourceRegistry,
};

fn quick_poller() -> Poller {
    Poller::new(Duration::from_millis(1), Duration::from_millis(200))
}

fn config() -> HarnessConfig {
    HarnessConfig::default().with_poll(PollConfig::new(Duration::from_millis(1), Duration::from_millis(200)))
}

#[test]
fn test_n_messages_come_back_in_order() {
    for count in [0u64, 1, 7, 250] {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(ResourceRegistry::new(dir.path()).unwrap());
        let mut doc = ConfigDocument::new(registry, &config());
        let mut source = doc.file_source(FileSourceOptions::new()).unwrap();

        let fields = LogMessageFields::bsd_defaults().hostname("host");
        let messages: Vec<String> = (1..=count)
            .map(|i| format_message(&fields.clone().message(format!("message {i}")), MessageFormat::Bsd, false))
            .collect();
        source.write_logs(&messages).unwrap();
        assert_eq!(source.get_stats().writes, u64::from(count > 0));

        let path = match &source.properties().endpoint {
            light_core::syslog_ng_config::Endpoint::Path(path) => path.clone(),
            other => panic!("unexpected endpoint {other}"),
        };
        let mut reader = LineReader::new(FileIo::new(path, quick_poller()), quick_poller());
        let read = reader.pop_messages(count as usize).unwrap();
        assert_eq!(read, messages, "count {count}");
        assert!(reader.pop_all().unwrap().is_empty());
    }
}

#[test]
fn test_generator_output_reads_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("generated.log");
    let generator = MessageGenerator::bsd();
    let mut writer = FileIo::new(&path, quick_poller());
    for message in generator.generate(20) {
        light_core::DriverIo::write(&mut writer, message.as_bytes()).unwrap();
    }

    let mut reader = LineReader::new(FileIo::new(&path, quick_poller()), quick_poller());
    let lines = reader.pop_messages(25).unwrap();
    assert_eq!(lines.len(), 20);
    assert!(lines[0].ends_with(&format!("{DEFAULT_MESSAGE} - counter: 1")));
    assert!(lines[19].ends_with(&format!("{DEFAULT_MESSAGE} - counter: 20")));
}

#[test]
fn test_octet_count_matches_utf8_length() {
    let payloads = ["plain", "árvíztűrő tükörfúrógép", "日本語のメッセージ", "emoji 🚀 inside", ""];
    for payload in payloads {
        for newline in [false, true] {
            let fields = LogMessageFields::ietf_defaults().message(payload);
            let framed = format_message(&fields, MessageFormat::Ietf, newline);
            let (prefix, rest) = framed.split_once(' ').unwrap();
            assert_eq!(prefix.parse::<usize>().unwrap(), rest.len(), "{framed:?}");
        }
    }
}

#[test]
fn test_absent_fields_leave_no_separators() {
    let fields = LogMessageFields::new().priority(13).message("only message");
    assert_eq!(format_message(&fields, MessageFormat::Bsd, false), "<13>only message");

    let no_pid = LogMessageFields::new().program("prog").message("m");
    assert_eq!(format_message(&no_pid, MessageFormat::Bsd, false), "prog: m");
    assert!(!format_message(&no_pid, MessageFormat::Bsd, false).contains('['));
}
