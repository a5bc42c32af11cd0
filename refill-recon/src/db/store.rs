//! PostgreSQL venue store
//!
//! Schema: `venues` (one row per canonical venue, geometry kept in sync with
//! lat/lng via PostGIS), `categories`, and the `venue_categories` join table.
//! Upserts key on the venue UUID; identity resolution has already happened
//! in the pipeline by the time anything reaches here.

use super::VenueStore;
use refill_common::models::{CanonicalVenue, Coordinates, PriceInfo, StructuredHours, VenueStatus};
use refill_common::{Error, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

const SCHEMA: &str = r#"
CREATE EXTENSION IF NOT EXISTS postgis;

CREATE TABLE IF NOT EXISTS venues (
    id UUID PRIMARY KEY,
    external_id TEXT UNIQUE,
    name TEXT NOT NULL,
    address TEXT NOT NULL,
    lat DOUBLE PRECISION NOT NULL,
    lng DOUBLE PRECISION NOT NULL,
    geom GEOMETRY(POINT, 4326) NOT NULL,
    phone TEXT,
    price_min INTEGER,
    price_max INTEGER,
    price_raw TEXT,
    hours_raw TEXT,
    hours JSONB,
    images TEXT[] NOT NULL DEFAULT '{}',
    refill_items TEXT[] NOT NULL DEFAULT '{}',
    status TEXT NOT NULL,
    needs_review BOOLEAN NOT NULL DEFAULT FALSE,
    alias_external_ids TEXT[] NOT NULL DEFAULT '{}',
    liveness_failures INTEGER NOT NULL DEFAULT 0,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    last_seen_at TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_venues_geom ON venues USING GIST (geom);
CREATE INDEX IF NOT EXISTS idx_venues_status ON venues (status);

CREATE TABLE IF NOT EXISTS categories (
    id SERIAL PRIMARY KEY,
    name TEXT UNIQUE NOT NULL
);

CREATE TABLE IF NOT EXISTS venue_categories (
    venue_id UUID NOT NULL REFERENCES venues(id) ON DELETE CASCADE,
    category_id INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
    PRIMARY KEY (venue_id, category_id)
);
"#;

pub struct PgVenueStore {
    pool: PgPool,
}

impl PgVenueStore {
    /// Connect and ensure the schema exists
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        for statement in SCHEMA.split(';').filter(|s| !s.trim().is_empty()) {
            sqlx::query(statement).execute(&pool).await?;
        }
        info!("database schema ready");

        Ok(Self { pool })
    }

    async fn upsert_one(
        tx: &mut Transaction<'_, Postgres>,
        venue: &CanonicalVenue,
    ) -> Result<()> {
        debug!(venue = %venue.name, geom = %venue.geometry_wkt(), "upserting venue");

        let hours_json = venue
            .hours
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| Error::Internal(format!("serialize hours: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO venues (
                id, external_id, name, address, lat, lng, geom,
                phone, price_min, price_max, price_raw, hours_raw, hours,
                images, refill_items, status, needs_review,
                alias_external_ids, liveness_failures,
                created_at, updated_at, last_seen_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, ST_SetSRID(ST_MakePoint($6, $5), 4326),
                $7, $8, $9, $10, $11, $12,
                $13, $14, $15, $16,
                $17, $18,
                $19, $20, $21
            )
            ON CONFLICT (id) DO UPDATE SET
                external_id = EXCLUDED.external_id,
                name = EXCLUDED.name,
                address = EXCLUDED.address,
                lat = EXCLUDED.lat,
                lng = EXCLUDED.lng,
                geom = EXCLUDED.geom,
                phone = EXCLUDED.phone,
                price_min = EXCLUDED.price_min,
                price_max = EXCLUDED.price_max,
                price_raw = EXCLUDED.price_raw,
                hours_raw = EXCLUDED.hours_raw,
                hours = EXCLUDED.hours,
                images = EXCLUDED.images,
                refill_items = EXCLUDED.refill_items,
                status = EXCLUDED.status,
                needs_review = EXCLUDED.needs_review,
                alias_external_ids = EXCLUDED.alias_external_ids,
                liveness_failures = EXCLUDED.liveness_failures,
                updated_at = EXCLUDED.updated_at,
                last_seen_at = EXCLUDED.last_seen_at
            "#,
        )
        .bind(venue.id)
        .bind(&venue.external_id)
        .bind(&venue.name)
        .bind(&venue.address)
        .bind(venue.coordinates.lat)
        .bind(venue.coordinates.lng)
        .bind(&venue.phone)
        .bind(venue.price.as_ref().map(|p| p.min_price as i32))
        .bind(venue.price.as_ref().map(|p| p.max_price as i32))
        .bind(venue.price.as_ref().map(|p| p.raw.clone()))
        .bind(&venue.hours_raw)
        .bind(hours_json)
        .bind(&venue.images)
        .bind(&venue.refill_items)
        .bind(venue.status.as_str())
        .bind(venue.needs_review)
        .bind(&venue.alias_external_ids)
        .bind(venue.liveness_failures as i32)
        .bind(venue.created_at)
        .bind(venue.updated_at)
        .bind(venue.last_seen_at)
        .execute(&mut **tx)
        .await?;

        // Category names first, then rebuild the join rows for this venue
        for name in &venue.categories {
            sqlx::query("INSERT INTO categories (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
                .bind(name)
                .execute(&mut **tx)
                .await?;
        }
        sqlx::query("DELETE FROM venue_categories WHERE venue_id = $1")
            .bind(venue.id)
            .execute(&mut **tx)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO venue_categories (venue_id, category_id)
            SELECT $1, id FROM categories WHERE name = ANY($2)
            "#,
        )
        .bind(venue.id)
        .bind(&venue.categories)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}

impl VenueStore for PgVenueStore {
    async fn load_existing(&self) -> Result<Vec<CanonicalVenue>> {
        let rows = sqlx::query(
            r#"
            SELECT v.id, v.external_id, v.name, v.address, v.lat, v.lng,
                   v.phone, v.price_min, v.price_max, v.price_raw,
                   v.hours_raw, v.hours, v.images, v.refill_items,
                   v.status, v.needs_review, v.alias_external_ids,
                   v.liveness_failures, v.created_at, v.updated_at, v.last_seen_at,
                   COALESCE(
                       ARRAY(
                           SELECT c.name FROM categories c
                           JOIN venue_categories vc ON vc.category_id = c.id
                           WHERE vc.venue_id = v.id
                           ORDER BY c.name
                       ),
                       '{}'
                   ) AS categories
            FROM venues v
            ORDER BY v.name, v.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut venues = Vec::with_capacity(rows.len());
        for row in rows {
            let status_text: String = row.try_get("status")?;
            let status = VenueStatus::parse(&status_text)
                .ok_or_else(|| Error::Internal(format!("unknown venue status: {status_text}")))?;

            let price = match (
                row.try_get::<Option<i32>, _>("price_min")?,
                row.try_get::<Option<i32>, _>("price_max")?,
            ) {
                (Some(min), Some(max)) => Some(PriceInfo {
                    min_price: u32::try_from(min).unwrap_or(0),
                    max_price: u32::try_from(max).unwrap_or(0),
                    raw: row
                        .try_get::<Option<String>, _>("price_raw")?
                        .unwrap_or_default(),
                }),
                _ => None,
            };

            let hours: Option<StructuredHours> = row
                .try_get::<Option<serde_json::Value>, _>("hours")?
                .map(serde_json::from_value)
                .transpose()
                .map_err(|e| Error::Internal(format!("deserialize hours: {e}")))?;

            let liveness: i32 = row.try_get("liveness_failures")?;

            venues.push(CanonicalVenue {
                id: row.try_get::<Uuid, _>("id")?,
                external_id: row.try_get("external_id")?,
                name: row.try_get("name")?,
                address: row.try_get("address")?,
                coordinates: Coordinates::new(row.try_get("lat")?, row.try_get("lng")?),
                categories: row.try_get("categories")?,
                phone: row.try_get("phone")?,
                price,
                hours_raw: row.try_get("hours_raw")?,
                hours,
                images: row.try_get("images")?,
                refill_items: row.try_get("refill_items")?,
                status,
                needs_review: row.try_get("needs_review")?,
                alias_external_ids: row.try_get("alias_external_ids")?,
                liveness_failures: u32::try_from(liveness).unwrap_or(0),
                created_at: row.try_get("created_at")?,
                updated_at: row.try_get("updated_at")?,
                last_seen_at: row.try_get("last_seen_at")?,
            });
        }

        debug!(count = venues.len(), "loaded canonical venues");
        Ok(venues)
    }

    async fn upsert_batch(&self, venues: &[CanonicalVenue]) -> Result<()> {
        if venues.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for venue in venues {
            Self::upsert_one(&mut tx, venue).await?;
        }
        tx.commit().await?;
        info!(count = venues.len(), "venue batch persisted");
        Ok(())
    }
}
