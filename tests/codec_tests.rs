use anyhow::Result;
use chrono::{TimeZone, Utc};
use lapin::{
    BasicProperties,
    types::{AMQPValue, FieldTable},
};
use notification_worker::{
    clients::rbmq::{RETRY_COUNT_HEADER, retry_count_from},
    models::message::{NotificationJob, NotificationPriority, NotificationType},
};
use serde_json::json;

fn sms_wire_body() -> serde_json::Value {
    json!({
        "id": "notif-001",
        "type": "sms",
        "priority": 10,
        "recipient_id": "user-42",
        "payload": {
            "payload": {
                "notification": { "title": "Storm warning", "body": "Heavy rain expected tonight" },
                "destinations": ["+15550001111", "+15550002222"]
            }
        },
        "retry_count": 0,
        "max_retries": 3,
        "created_at": "2026-08-01T09:30:00Z"
    })
}

/// Test: A well-formed wire payload decodes into a typed job
#[test]
fn test_decode_well_formed_job() -> Result<()> {
    let body = sms_wire_body().to_string();

    let job = NotificationJob::decode(body.as_bytes())?;

    assert_eq!(job.id, "notif-001");
    assert_eq!(job.kind, NotificationType::Sms);
    assert_eq!(job.priority, NotificationPriority::HIGH);
    assert_eq!(job.recipient_id, "user-42");
    assert_eq!(job.retry_count, 0);
    assert_eq!(job.max_retries, 3);
    assert_eq!(
        job.created_at,
        Utc.with_ymd_and_hms(2026, 8, 1, 9, 30, 0).unwrap()
    );
    assert!(job.scheduled_for.is_none());

    Ok(())
}

/// Test: Decoding the same payload twice yields identical jobs
#[test]
fn test_decode_is_idempotent() -> Result<()> {
    let body = sms_wire_body().to_string();

    let first = NotificationJob::decode(body.as_bytes())?;
    let second = NotificationJob::decode(body.as_bytes())?;

    assert_eq!(first, second);

    Ok(())
}

/// Test: Absent retry_count and max_retries fall back to 0 and 3
#[test]
fn test_decode_applies_retry_defaults() -> Result<()> {
    let body = json!({
        "id": "notif-002",
        "type": "email",
        "priority": 5,
        "recipient_id": "user-7",
        "payload": {},
        "created_at": "2026-08-01T10:00:00Z"
    })
    .to_string();

    let job = NotificationJob::decode(body.as_bytes())?;

    assert_eq!(job.retry_count, 0);
    assert_eq!(job.max_retries, 3);

    Ok(())
}

/// Test: Any integer priority is accepted, not just the named levels
#[test]
fn test_decode_accepts_unnamed_priority() -> Result<()> {
    let body = json!({
        "id": "notif-003",
        "type": "in_app",
        "priority": 7,
        "recipient_id": "user-9",
        "payload": {},
        "created_at": "2026-08-01T10:00:00Z"
    })
    .to_string();

    let job = NotificationJob::decode(body.as_bytes())?;

    assert_eq!(job.priority, NotificationPriority(7));
    assert!(job.priority > NotificationPriority::NORMAL);
    assert!(job.priority < NotificationPriority::HIGH);

    Ok(())
}

/// Test: A payload missing required fields is a decode error
#[test]
fn test_decode_rejects_missing_fields() {
    let body = json!({
        "id": "notif-004",
        "type": "sms",
        "priority": 5,
        "payload": {},
        "created_at": "2026-08-01T10:00:00Z"
    })
    .to_string();

    assert!(NotificationJob::decode(body.as_bytes()).is_err());
}

/// Test: An unknown notification type is a decode error
#[test]
fn test_decode_rejects_unknown_type() {
    let body = json!({
        "id": "notif-005",
        "type": "fax",
        "priority": 5,
        "recipient_id": "user-1",
        "payload": {},
        "created_at": "2026-08-01T10:00:00Z"
    })
    .to_string();

    assert!(NotificationJob::decode(body.as_bytes()).is_err());
}

/// Test: A present scheduled_for timestamp is carried through
#[test]
fn test_decode_carries_scheduled_for() -> Result<()> {
    let body = json!({
        "id": "notif-006",
        "type": "sms",
        "priority": 1,
        "recipient_id": "user-1",
        "payload": {},
        "created_at": "2026-08-01T10:00:00Z",
        "scheduled_for": "2026-08-02T08:00:00Z"
    })
    .to_string();

    let job = NotificationJob::decode(body.as_bytes())?;

    assert_eq!(
        job.scheduled_for,
        Some(Utc.with_ymd_and_hms(2026, 8, 2, 8, 0, 0).unwrap())
    );

    Ok(())
}

/// Test: The nested sms payload decodes with title, body, and destinations
#[test]
fn test_sms_payload_decodes() -> Result<()> {
    let job = NotificationJob::decode(sms_wire_body().to_string().as_bytes())?;

    let sms = job.sms_payload()?;

    assert_eq!(sms.payload.notification.title, "Storm warning");
    assert_eq!(sms.payload.notification.body, "Heavy rain expected tonight");
    assert_eq!(
        sms.payload.destinations,
        vec!["+15550001111".to_string(), "+15550002222".to_string()]
    );

    Ok(())
}

/// Test: A payload without the sms shape fails the type-specific decode
#[test]
fn test_sms_payload_rejects_wrong_shape() -> Result<()> {
    let body = json!({
        "id": "notif-007",
        "type": "sms",
        "priority": 5,
        "recipient_id": "user-1",
        "payload": { "unexpected": true },
        "created_at": "2026-08-01T10:00:00Z"
    })
    .to_string();

    let job = NotificationJob::decode(body.as_bytes())?;

    assert!(job.sms_payload().is_err());

    Ok(())
}

/// Test: An absent retry header reads as zero
#[test]
fn test_retry_count_defaults_to_zero() {
    assert_eq!(retry_count_from(&BasicProperties::default()), 0);
}

/// Test: The retry counter is read from the x-retry-count header
#[test]
fn test_retry_count_read_from_header() {
    let mut headers = FieldTable::default();
    headers.insert(RETRY_COUNT_HEADER.into(), AMQPValue::LongInt(2));

    let properties = BasicProperties::default().with_headers(headers);

    assert_eq!(retry_count_from(&properties), 2);
}

/// Test: Negative and non-integer header values read as zero
#[test]
fn test_retry_count_ignores_malformed_headers() {
    let mut negative = FieldTable::default();
    negative.insert(RETRY_COUNT_HEADER.into(), AMQPValue::LongInt(-4));
    assert_eq!(
        retry_count_from(&BasicProperties::default().with_headers(negative)),
        0
    );

    let mut non_integer = FieldTable::default();
    non_integer.insert(RETRY_COUNT_HEADER.into(), AMQPValue::LongString("two".into()));
    assert_eq!(
        retry_count_from(&BasicProperties::default().with_headers(non_integer)),
        0
    );
}
