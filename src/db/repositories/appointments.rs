use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use crate::db::{
    helpers::{format_datetime, parse_datetime, parse_optional_datetime, parse_status},
    models::{AppointmentStatus, PendingAppointment, StatusCounts},
    Database,
};

fn row_to_appointment(row: &Row) -> Result<PendingAppointment> {
    let payload: String = row.get("payload")?;
    let status: String = row.get("status")?;
    let created_at: String = row.get("created_at")?;
    let synced_at: Option<String> = row.get("synced_at")?;

    Ok(PendingAppointment {
        id: row.get("id")?,
        payload: serde_json::from_str(&payload).context("failed to decode appointment payload")?,
        status: parse_status(&status)?,
        created_at: parse_datetime(&created_at, "created_at")?,
        synced_at: parse_optional_datetime(synced_at, "synced_at")?,
    })
}

impl Database {
    pub async fn insert_appointment(&self, appointment: &PendingAppointment) -> Result<()> {
        let record = appointment.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO appointments (id, payload, status, created_at, synced_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.id,
                    record.payload.to_string(),
                    record.status.as_str(),
                    format_datetime(&record.created_at),
                    record.synced_at.as_ref().map(format_datetime),
                ],
            )
            .with_context(|| format!("failed to insert appointment {}", record.id))?;
            Ok(())
        })
        .await
    }

    pub async fn list_pending_appointments(&self) -> Result<Vec<PendingAppointment>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, payload, status, created_at, synced_at
                 FROM appointments
                 WHERE status = 'pending'
                 ORDER BY created_at ASC",
            )?;

            let mut rows = stmt.query([])?;
            let mut appointments = Vec::new();
            while let Some(row) = rows.next()? {
                appointments.push(row_to_appointment(row)?);
            }

            Ok(appointments)
        })
        .await
    }

    pub async fn get_appointment(&self, id: &str) -> Result<Option<PendingAppointment>> {
        let id = id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, payload, status, created_at, synced_at
                 FROM appointments
                 WHERE id = ?1",
            )?;

            let mut rows = stmt.query(params![id])?;
            let appointment = match rows.next()? {
                Some(row) => Some(row_to_appointment(row)?),
                None => None,
            };
            Ok(appointment)
        })
        .await
    }

    /// Moves a pending record to `synced`. Unknown or already-synced ids are left alone.
    pub async fn mark_appointment_synced(&self, id: &str, synced_at: DateTime<Utc>) -> Result<bool> {
        let id = id.to_string();
        self.execute(move |conn| {
            let rows_affected = conn
                .execute(
                    "UPDATE appointments
                     SET status = ?1,
                         synced_at = ?2
                     WHERE id = ?3 AND status = ?4",
                    params![
                        AppointmentStatus::Synced.as_str(),
                        format_datetime(&synced_at),
                        id,
                        AppointmentStatus::Pending.as_str(),
                    ],
                )
                .with_context(|| format!("failed to mark appointment {id} synced"))?;
            Ok(rows_affected > 0)
        })
        .await
    }

    pub async fn count_appointments_by_status(&self) -> Result<StatusCounts> {
        self.execute(|conn| {
            let mut stmt =
                conn.prepare("SELECT status, COUNT(*) FROM appointments GROUP BY status")?;
            let mut rows = stmt.query([])?;

            let mut counts = StatusCounts::default();
            while let Some(row) = rows.next()? {
                let status: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                let count = u64::try_from(count).unwrap_or(0);
                match parse_status(&status)? {
                    AppointmentStatus::Pending => counts.pending = count,
                    AppointmentStatus::Synced => counts.synced = count,
                }
            }

            Ok(counts)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_insert_and_list_pending() {
        let db = Database::open_in_memory().unwrap();
        let first = PendingAppointment::new(json!({ "name": "陳大文" }));
        let second = PendingAppointment::new(json!({ "name": "Alice" }));
        db.insert_appointment(&first).await.unwrap();
        db.insert_appointment(&second).await.unwrap();

        let pending = db.list_pending_appointments().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(PendingAppointment::is_pending));

        let loaded = db.get_appointment(&first.id).await.unwrap().unwrap();
        assert_eq!(loaded.payload, json!({ "name": "陳大文" }));
    }

    #[tokio::test]
    async fn test_mark_synced_is_one_way() {
        let db = Database::open_in_memory().unwrap();
        let record = PendingAppointment::new(json!({ "phone": "91234567" }));
        db.insert_appointment(&record).await.unwrap();

        assert!(db.mark_appointment_synced(&record.id, Utc::now()).await.unwrap());
        assert!(!db.mark_appointment_synced(&record.id, Utc::now()).await.unwrap());

        let loaded = db.get_appointment(&record.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, AppointmentStatus::Synced);
        assert!(loaded.synced_at.is_some());
        assert!(db.list_pending_appointments().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_synced_unknown_id_is_noop() {
        let db = Database::open_in_memory().unwrap();
        assert!(!db.mark_appointment_synced("missing", Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_count_by_status() {
        let db = Database::open_in_memory().unwrap();
        let a = PendingAppointment::new(json!({}));
        let b = PendingAppointment::new(json!({}));
        db.insert_appointment(&a).await.unwrap();
        db.insert_appointment(&b).await.unwrap();
        db.mark_appointment_synced(&b.id, Utc::now()).await.unwrap();

        let counts = db.count_appointments_by_status().await.unwrap();
        assert_eq!(counts, StatusCounts { pending: 1, synced: 1 });
    }
}
