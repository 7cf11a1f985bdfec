use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

pub fn open_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)
        .with_context(|| format!("failed to open db: {}", db_path.display()))?;
    conn.execute("PRAGMA foreign_keys = ON", [])
        .context("failed to enable foreign key enforcement")?;
    Ok(conn)
}

pub fn init_db(db_path: &Path) -> Result<()> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create parent dir: {}", parent.display()))?;
    }

    let conn = open_connection(db_path)?;

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS persons (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT NOT NULL,
            id_card     TEXT,
            created_at  TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at  TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS patient_profiles (
            person_id   INTEGER PRIMARY KEY,
            gender      TEXT,
            birth_date  TEXT,
            hometown    TEXT,
            ethnicity   TEXT,
            FOREIGN KEY (person_id) REFERENCES persons(id)
        );

        CREATE TABLE IF NOT EXISTS medical_info (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            person_id       INTEGER NOT NULL,
            hospital        TEXT,
            diagnosis       TEXT,
            doctor_name     TEXT,
            symptoms        TEXT,
            follow_up_plan  TEXT,
            record_date     TEXT,
            FOREIGN KEY (person_id) REFERENCES persons(id)
        );

        CREATE TABLE IF NOT EXISTS check_in_records (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            person_id       INTEGER NOT NULL,
            check_in_date   TEXT,
            attendees       TEXT,
            details         TEXT,
            treatment_plan  TEXT,
            FOREIGN KEY (person_id) REFERENCES persons(id)
        );

        CREATE TABLE IF NOT EXISTS family_info (
            person_id       INTEGER PRIMARY KEY,
            home_address    TEXT,
            father_name     TEXT,
            father_phone    TEXT,
            father_id_card  TEXT,
            mother_name     TEXT,
            mother_phone    TEXT,
            mother_id_card  TEXT,
            other_guardian  TEXT,
            economic_status TEXT,
            FOREIGN KEY (person_id) REFERENCES persons(id)
        );

        CREATE TABLE IF NOT EXISTS family_service_records (
            id                          INTEGER PRIMARY KEY AUTOINCREMENT,
            sequence_number             TEXT,
            year_month                  TEXT NOT NULL UNIQUE,
            family_count                INTEGER NOT NULL DEFAULT 0,
            residents_count             INTEGER NOT NULL DEFAULT 0,
            residence_days              INTEGER NOT NULL DEFAULT 0,
            accommodation_count         INTEGER NOT NULL DEFAULT 0,
            care_service_count          INTEGER NOT NULL DEFAULT 0,
            volunteer_service_count     INTEGER NOT NULL DEFAULT 0,
            total_service_count         INTEGER NOT NULL DEFAULT 0,
            notes                       TEXT,
            cumulative_residence_days   INTEGER NOT NULL DEFAULT 0,
            cumulative_service_count    INTEGER NOT NULL DEFAULT 0,
            created_at                  TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at                  TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE INDEX IF NOT EXISTS idx_persons_id_card
            ON persons(id_card);

        CREATE INDEX IF NOT EXISTS idx_check_in_person_date
            ON check_in_records(person_id, check_in_date);

        CREATE INDEX IF NOT EXISTS idx_medical_info_person
            ON medical_info(person_id);
        ",
    )
    .context("failed to initialize schema")?;

    Ok(())
}

