//! End-to-end session tests against the in-memory Bluetooth host.

use std::sync::Arc;

use agentprint::{
    ConnectionState, DeviceIdentity, PrinterError, PrinterSession, SessionConfig,
    receipt::ReceiptContext,
    telemetry::{Reading, WINDOW_CAPACITY},
    transport::{
        Permission,
        memory::{AdapterCall, MemoryAdapter, MemoryPermissions},
    },
};
use pretty_assertions::assert_eq;

const PRINTER: &str = "DC:0D:30:8A:41:7C";
const SCALE: &str = "66:32:B1:D0:0E:5F";

const RECEIPT_JSON: &str = r#"{
    "customer_name": "Lakshmi Devi",
    "phone": "9000012345",
    "receipt_no": "GL-2291",
    "date": "2026-10-16T09:05:00",
    "account": {"kind": "gold_loan", "loan_no": "GL-88"},
    "amount": 25000.0,
    "payment_mode": "upi",
    "agent": {"name": "Suresh", "code": "AG-07"}
}"#;

fn printer() -> DeviceIdentity {
    DeviceIdentity::new(PRINTER, "PT-210")
}

fn scale() -> DeviceIdentity {
    DeviceIdentity::new(SCALE, "Scale")
}

fn open(adapter: &MemoryAdapter) -> PrinterSession {
    open_with(adapter, MemoryPermissions::granting_all())
}

fn open_with(adapter: &MemoryAdapter, permissions: MemoryPermissions) -> PrinterSession {
    PrinterSession::open(
        SessionConfig::default(),
        Arc::new(permissions),
        Arc::new(adapter.clone()),
    )
}

#[tokio::test]
async fn test_scan_and_connect_to_discovered_printer() {
    let adapter = MemoryAdapter::new()
        .discover(DeviceIdentity::new("11:22:33:44:55:66", "Headphones"))
        .discover(printer());
    let session = open(&adapter);

    let device = session.request_scan_and_connect().await.unwrap();
    assert_eq!(device, printer());
    assert!(session.is_connected());
    assert_eq!(
        *session.connection_state().borrow(),
        ConnectionState::Connected(printer())
    );
    assert_eq!(adapter.calls().last(), Some(&AdapterCall::Connect(PRINTER.to_string())));
}

#[tokio::test]
async fn test_bonded_fallback() {
    let adapter = MemoryAdapter::new()
        .discover(DeviceIdentity::new("11:22:33:44:55:66", "Headphones"))
        .bond(scale());
    let session = open(&adapter);

    let device = session.request_scan_and_connect().await.unwrap();
    assert_eq!(device.address, SCALE);
}

#[tokio::test]
async fn test_device_not_found_leaves_session_idle() {
    let adapter = MemoryAdapter::new().bond(DeviceIdentity::new("AA:BB:CC:DD:EE:FF", "Car"));
    let session = open(&adapter);

    let err = session.request_scan_and_connect().await.unwrap_err();
    assert!(matches!(err, PrinterError::DeviceNotFound));
    assert_eq!(*session.connection_state().borrow(), ConnectionState::Idle);
    assert!(
        !adapter
            .calls()
            .iter()
            .any(|c| matches!(c, AdapterCall::Connect(_)))
    );
}

#[tokio::test]
async fn test_permission_denied() {
    let adapter = MemoryAdapter::new().discover(printer());
    let session = open_with(
        &adapter,
        MemoryPermissions::denying(&[Permission::AccessFineLocation]),
    );

    let err = session.request_scan_and_connect().await.unwrap_err();
    assert!(matches!(err, PrinterError::PermissionDenied(_)));
    assert!(!session.is_connected());
}

#[tokio::test]
async fn test_connection_error_is_reported() {
    let adapter = MemoryAdapter::new().discover(printer()).unreachable(PRINTER);
    let session = open(&adapter);

    let err = session.request_scan_and_connect().await.unwrap_err();
    match err {
        PrinterError::Connection { address, .. } => assert_eq!(address, PRINTER),
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(*session.connection_state().borrow(), ConnectionState::Idle);
}

#[tokio::test]
async fn test_print_before_connect_writes_nothing() {
    let adapter = MemoryAdapter::new().discover(printer());
    let session = open(&adapter);

    let err = session.print_text("hello").await.unwrap_err();
    assert!(matches!(err, PrinterError::NotConnected));
    assert!(adapter.device(PRINTER).writes().is_empty());
    assert!(adapter.calls().is_empty());
}

#[tokio::test]
async fn test_print_text_job_framing() {
    let adapter = MemoryAdapter::new().discover(printer());
    let session = open(&adapter);
    session.request_scan_and_connect().await.unwrap();

    session.print_text("Hello").await.unwrap();

    let writes = adapter.device(PRINTER).writes();
    assert_eq!(writes, vec![b"\x1b\x00Hello\n".to_vec()]);
}

#[tokio::test]
async fn test_print_formatted_receipt() {
    let adapter = MemoryAdapter::new().discover(printer());
    let session = open(&adapter);
    session.request_scan_and_connect().await.unwrap();

    let ctx = ReceiptContext::from_json(RECEIPT_JSON).unwrap();
    session.print_formatted_receipt(&ctx).await.unwrap();

    let writes = adapter.device(PRINTER).writes();
    assert_eq!(writes.len(), 1);
    let job = &writes[0];
    assert_eq!(&job[..2], &[0x1B, 0x00]);
    assert_eq!(job.last(), Some(&b'\n'));

    let text = String::from_utf8(job[2..].to_vec()).unwrap();
    assert!(text.contains("GOLD LOAN REPAYMENT RECEIPT"));
    assert!(text.contains("GL-88"));
    assert!(text.contains("Rs. 25,000.00"));
    assert!(text.contains("UPI"));
    assert!(text.lines().all(|l| l.chars().count() <= 40));
}

#[tokio::test]
async fn test_html_needs_no_connection() {
    let session = open(&MemoryAdapter::new());
    let ctx = ReceiptContext::from_json(RECEIPT_JSON).unwrap();

    let html = session.render_html(&ctx);
    assert!(html.contains("Lakshmi Devi"));
    assert!(html.contains("&#8377; 25,000.00"));
    assert!(!session.is_connected());
}

#[tokio::test]
async fn test_connect_a_then_b_keeps_one_subscription() {
    let adapter = MemoryAdapter::new();
    let session = open(&adapter);

    session.connect(&printer()).await.unwrap();
    session.connect(&scale()).await.unwrap();

    let a = adapter.device(PRINTER);
    let b = adapter.device(SCALE);
    assert_eq!(a.active_subscriptions(), 0);
    assert_eq!(a.open_links(), 0);
    assert_eq!(b.active_subscriptions(), 1);
    assert_eq!(b.open_links(), 1);

    // Frames from the old device go nowhere
    assert_eq!(a.push_frame("1 kg"), 0);
    assert_eq!(b.push_frame("1 kg"), 1);
}

#[tokio::test]
async fn test_telemetry_over_live_link() {
    let adapter = MemoryAdapter::new().discover(scale());
    let session = open(&adapter);
    let mut telemetry = session.telemetry();
    session.request_scan_and_connect().await.unwrap();

    let device = adapter.device(SCALE);
    for frame in ["ST,GS,  12.40kg", "noise", "ST,GS,  12.50kg", "ST,GS,  12.50kg"] {
        device.push_frame(frame);
    }

    let state = telemetry
        .wait_for(|s| s.window.len() == 3)
        .await
        .unwrap()
        .clone();
    assert_eq!(state.latest, Some(Reading::new("12.50kg")));
    assert!(!state.stability.is_stable);

    for _ in 0..WINDOW_CAPACITY {
        device.push_frame("ST,GS,  12.50kg");
    }
    let state = telemetry
        .wait_for(|s| s.stability.is_stable)
        .await
        .unwrap()
        .clone();
    assert_eq!(state.window.len(), WINDOW_CAPACITY);
    assert_eq!(state.stability.stable_value, Some(Reading::new("12.50kg")));
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let adapter = MemoryAdapter::new().discover(printer());
    let session = open(&adapter);
    session.request_scan_and_connect().await.unwrap();

    session.disconnect().await;
    session.disconnect().await;

    assert!(!session.is_connected());
    assert_eq!(adapter.device(PRINTER).open_links(), 0);
    assert_eq!(adapter.device(PRINTER).active_subscriptions(), 0);

    let err = session.print_text("after").await.unwrap_err();
    assert!(matches!(err, PrinterError::NotConnected));
}

/// Position in the connect/disconnect cycle.
fn rank(state: &ConnectionState) -> u8 {
    match state {
        ConnectionState::Idle => 0,
        ConnectionState::Discovering => 1,
        ConnectionState::Connecting => 2,
        ConnectionState::Connected(_) => 3,
        ConnectionState::Disconnecting => 4,
    }
}

#[tokio::test]
async fn test_state_transitions() {
    let adapter = MemoryAdapter::new().discover(printer());
    let session = open(&adapter);
    let mut states = session.connection_state();

    let recorder = tokio::spawn(async move {
        let mut seen = Vec::new();
        while states.changed().await.is_ok() {
            seen.push(states.borrow_and_update().clone());
        }
        seen
    });

    session.request_scan_and_connect().await.unwrap();
    session.disconnect().await;
    // Closes the channel so the recorder finishes
    drop(session);

    // watch keeps only the newest value, so states may be skipped, but the
    // ones observed never move backwards through the cycle
    let seen = recorder.await.unwrap();
    assert_eq!(seen.last(), Some(&ConnectionState::Idle));
    let cycle: Vec<u8> = seen[..seen.len() - 1].iter().map(rank).collect();
    assert!(cycle.windows(2).all(|w| w[0] <= w[1]), "{:?}", seen);
    assert!(!cycle.contains(&0), "{:?}", seen);
}

#[tokio::test]
async fn test_close_disconnects() {
    let adapter = MemoryAdapter::new().discover(printer());
    let session = open(&adapter);
    session.request_scan_and_connect().await.unwrap();

    session.close().await;
    assert_eq!(adapter.device(PRINTER).open_links(), 0);
}
