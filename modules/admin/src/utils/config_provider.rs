use tracing::instrument;

use ordering::config::TrackingConfig;

/// One row of `shop.application_config`: a JSON document per well-known key.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApplicationConfig {
    #[allow(unused)]
    pub id: i32,
    #[allow(unused)]
    pub key: String,
    pub content: serde_json::Value,
}

/// A config document stored under a fixed key. Missing rows and cache misses
/// fall back to `Default`, so a fresh deployment works before any config has
/// been inserted.
pub trait ConfigJson: Default + for<'de> serde::Deserialize<'de> + serde::Serialize {
    const KEY: &'static str;
}

impl ConfigJson for TrackingConfig {
    const KEY: &'static str = "tracking_config";
}

fn cache_key<T: ConfigJson>() -> String {
    format!("config:{}", T::KEY)
}

#[instrument(
    skip_all,
    err,
    fields(
        config = std::any::type_name::<T>(),
        config_key = T::KEY
    )
)]
pub async fn find_config_from_db<T: ConfigJson>(
    db: impl sqlx::PgExecutor<'_>,
) -> Result<T, framework::Error> {
    let row: Option<ApplicationConfig> =
        sqlx::query_as("SELECT id, key, content FROM shop.application_config WHERE key = $1")
            .bind(T::KEY)
            .fetch_optional(db)
            .await?;
    match row {
        Some(row) => serde_json::from_value(row.content)
            .map_err(|e| framework::Error::DeserializeError(e.into())),
        None => Ok(T::default()),
    }
}

#[instrument(
    skip_all,
    err,
    fields(
        config = std::any::type_name::<T>(),
        config_key = T::KEY
    )
)]
pub async fn find_config_from_redis<T: ConfigJson>(
    redis: &mut impl redis::AsyncCommands,
) -> Result<T, framework::Error> {
    let cached: Option<String> = redis.get(cache_key::<T>()).await?;
    match cached {
        Some(json) => {
            serde_json::from_str(&json).map_err(|e| framework::Error::DeserializeError(e.into()))
        }
        None => Ok(T::default()),
    }
}

/// Re-reads the document from Postgres and overwrites the Redis copy.
#[instrument(
    skip_all,
    err,
    fields(
        config = std::any::type_name::<T>()
    )
)]
pub async fn refresh_config_cache<T: ConfigJson>(
    db: impl sqlx::PgExecutor<'_>,
    redis: &mut impl redis::AsyncCommands,
) -> Result<(), framework::Error> {
    let config = find_config_from_db::<T>(db).await?;
    let json =
        serde_json::to_string(&config).map_err(|e| framework::Error::SerializeError(e.into()))?;
    let _: () = redis.set(cache_key::<T>(), json).await?;
    Ok(())
}

#[instrument(
    skip(db),
    err,
    fields(
        config_key = T::KEY
    )
)]
pub async fn insert_config_into_db<T: ConfigJson + std::fmt::Debug>(
    db: impl sqlx::PgExecutor<'_>,
    config: &T,
) -> Result<(), framework::Error> {
    let content =
        serde_json::to_value(config).map_err(|e| framework::Error::SerializeError(e.into()))?;
    sqlx::query(
        "INSERT INTO shop.application_config (key, content) VALUES ($1, $2) \
         ON CONFLICT (key) DO UPDATE SET content = EXCLUDED.content",
    )
    .bind(T::KEY)
    .bind(content)
    .execute(db)
    .await?;
    Ok(())
}
