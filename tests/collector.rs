use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use cnc_collector::configuration::Config;
use cnc_collector::controller::Controller;
use cnc_collector::simulator::TrafficGenerator;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

const HEADER: &str =
    "Machine,Timestamp,Part_Number,Revision,Date_YYMMDD,Time_HHMMSS,Parts_Counter,Last_Part_Time_Seconds,Raw_Data";

fn csv_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = match fs::read_dir(dir) {
        Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    };
    files.sort();
    files
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..300 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

/// Starts a listening collector on an ephemeral loopback port.
async fn start_listener(config: Config) -> (Arc<Controller>, u16, JoinHandle<()>) {
    let controller = Arc::new(Controller::new(config).unwrap());
    let manager = controller.connection_manager().await.unwrap();
    let port = manager.local_addr().unwrap().port();
    let running = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.serve(manager).await.unwrap() })
    };
    (controller, port, running)
}

fn listener_config(log_dir: &Path, append: bool) -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        machine_name: Some("Mill_1".to_string()),
        append,
        log_dir: log_dir.to_path_buf(),
        ..Default::default()
    }
}

#[tokio::test]
async fn new_file_mode_writes_one_file_per_simulated_cycle() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().unwrap();
    let log_dir = dir.path().join("cnc_logs");
    let (controller, port, running) = start_listener(listener_config(&log_dir, false)).await;

    let generator = TrafficGenerator::new("127.0.0.1", port).with_delay(Duration::from_millis(20));
    generator.send_test_cycle("265-4183", "X2").await.unwrap();
    generator.send_test_cycle("265-4183", "X2").await.unwrap();

    eventually(|| csv_files(&log_dir).len() == 2).await;
    for file in csv_files(&log_dir) {
        let name = file.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("Mill_1_265-4183_"), "{name}");

        let mut reader = csv::Reader::from_path(&file).unwrap();
        assert_eq!(reader.headers().unwrap().iter().collect::<Vec<_>>().join(","), HEADER);
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(&rows[0][0], "Mill_1");
        assert_eq!(&rows[0][2], "265-4183");
        assert_eq!(&rows[0][3], "X2");
        assert!(rows[0][8].contains("End of Cycle"));
    }

    controller.shutdown();
    running.await.unwrap();
}

#[tokio::test]
async fn append_mode_groups_cycles_by_part_number() {
    let dir = tempfile::tempdir().unwrap();
    let log_dir = dir.path().to_path_buf();
    let (controller, port, running) = start_listener(listener_config(&log_dir, true)).await;

    let generator = TrafficGenerator::new("127.0.0.1", port).with_delay(Duration::from_millis(20));
    for rev in ["A", "B", "C"] {
        generator.send_test_cycle("TEST-001", rev).await.unwrap();
    }
    generator.send_test_cycle("OTHER-9", "A").await.unwrap();

    let grouped = log_dir.join("Mill_1_TEST-001.csv");
    let other = log_dir.join("Mill_1_OTHER-9.csv");
    eventually(|| {
        other.exists()
            && csv::Reader::from_path(&grouped)
                .map(|mut r| r.records().count() == 3)
                .unwrap_or(false)
    })
    .await;

    let content = fs::read_to_string(&grouped).unwrap();
    assert_eq!(content.matches(HEADER).count(), 1, "header repeated:\n{content}");
    let mut reader = csv::Reader::from_path(&grouped).unwrap();
    let mut revisions: Vec<String> = reader.records().map(|r| r.unwrap()[3].to_string()).collect();
    revisions.sort();
    assert_eq!(revisions, vec!["A", "B", "C"]);

    controller.shutdown();
    running.await.unwrap();
}

#[tokio::test]
async fn dialer_collects_from_a_machine_that_accepts_late() {
    let dir = tempfile::tempdir().unwrap();
    let log_dir = dir.path().to_path_buf();

    let reserved = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = reserved.local_addr().unwrap().port();
    drop(reserved);

    let config = Config {
        target: Some("127.0.0.1".to_string()),
        port,
        machine_name: Some("Lathe_B".to_string()),
        log_dir: log_dir.clone(),
        reconnect_delay_secs: 1,
        ..Default::default()
    };
    let controller = Arc::new(Controller::new(config).unwrap());
    let running = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.run().await.unwrap() })
    };

    // the first dial is refused; the machine comes up during the backoff
    tokio::time::sleep(Duration::from_millis(200)).await;
    let machine = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    let (mut socket, _) = machine.accept().await.unwrap();
    socket
        .write_all(b"DPRNT[ PART NUMBER: 88-120, REV. C]\nDPRNT[ PARTS MADE: 42]\n")
        .await
        .unwrap();
    socket
        .write_all(b"DPRNT[ TIME, LAST PART: 93.5 SECONDS]\nDPRNT[ End of Cycle]\n")
        .await
        .unwrap();

    eventually(|| csv_files(&log_dir).len() == 1).await;
    let mut reader = csv::Reader::from_path(&csv_files(&log_dir)[0]).unwrap();
    let row = reader.records().next().unwrap().unwrap();
    assert_eq!(&row[0], "Lathe_B");
    assert_eq!(&row[2], "88-120");
    assert_eq!(&row[6], "42");
    assert_eq!(&row[7], "93.5");

    controller.shutdown();
    tokio::time::timeout(Duration::from_secs(2), running)
        .await
        .expect("dialer ignored shutdown")
        .unwrap();
}
