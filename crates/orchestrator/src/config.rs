//! Configuration loaded from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use gen3d_providers::hunyuan::{HunyuanAdapter, HunyuanConfig};
use gen3d_providers::meshy::{MeshyAdapter, MeshyConfig};
use gen3d_providers::storage::StorageConfig;
use gen3d_providers::{AdapterRegistry, ProviderError};

use crate::service::{DEFAULT_DOWNLOAD_TIMEOUT, DEFAULT_QUERY_TIMEOUT};

/// Sweep interval when no provider is configured.
const FALLBACK_POLL_INTERVAL: Duration = Duration::from_secs(10);

const DEFAULT_POLL_CONCURRENCY: usize = 5;


#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} has an invalid value {value:?}: {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

/// Poller tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerConfig {
    /// Time between sweeps.
    pub interval: Duration,
    /// Maximum concurrent reconciliations per sweep.
    pub concurrency: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: FALLBACK_POLL_INTERVAL,
            concurrency: DEFAULT_POLL_CONCURRENCY,
        }
    }
}

/// Everything the orchestration layer needs at startup.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub poller: PollerConfig,
    /// Deadline for one remote status query.
    pub query_timeout: Duration,
    /// Deadline for materializing one task's artifacts.
    pub download_timeout: Duration,
    pub hunyuan: HunyuanConfig,
    pub meshy: MeshyConfig,
}

impl OrchestratorConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                          | Default                              |
    /// |----------------------------------|--------------------------------------|
    /// | `POLL_INTERVAL_SECS`             | shortest provider interval, else 10  |
    /// | `POLL_CONCURRENCY`               | `5`                                  |
    /// | `QUERY_TIMEOUT_SECS`             | `30`                                 |
    /// | `DOWNLOAD_TIMEOUT_SECS`          | `300`                                |
    /// | `HUNYUAN_SECRET_ID`              | (empty, provider disabled)           |
    /// | `HUNYUAN_SECRET_KEY`             | (empty, provider disabled)           |
    /// | `HUNYUAN_REGION`                 | `ap-guangzhou`                       |
    /// | `HUNYUAN_API_URL`                | `https://ai3d.tencentcloudapi.com`   |
    /// | `HUNYUAN_DEFAULT_MODEL`          | `3.1`                                |
    /// | `HUNYUAN_DEFAULT_FACE_COUNT`     | `500000`                             |
    /// | `HUNYUAN_DEFAULT_GENERATE_TYPE`  | `Normal`                             |
    /// | `HUNYUAN_DEFAULT_ENABLE_PBR`     | `false`                              |
    /// | `HUNYUAN_DEFAULT_RESULT_FORMAT`  | `GLB`                                |
    /// | `HUNYUAN_DEFAULT_CATEGORY`       | `AI生成`                             |
    /// | `HUNYUAN_POLL_INTERVAL`          | `5`                                  |
    /// | `HUNYUAN_REQUEST_TIMEOUT_SECS`   | `30`                                 |
    /// | `HUNYUAN_LOCAL_STORAGE_ENABLED`  | `true`                               |
    /// | `HUNYUAN_STORAGE_DIR`            | `static/hunyuan`                     |
    /// | `HUNYUAN_NAS_ENABLED`            | `false`                              |
    /// | `HUNYUAN_NAS_PATH`               | (none)                               |
    /// | `MESHY_API_KEY`                  | (empty, provider disabled)           |
    /// | `MESHY_BASE_URL`                 | `https://api.meshy.ai`               |
    /// | `MESHY_DEFAULT_AI_MODEL`         | `meshy-6`                            |
    /// | `MESHY_DEFAULT_ENABLE_PBR`       | `true`                               |
    /// | `MESHY_DEFAULT_TOPOLOGY`         | `triangle`                           |
    /// | `MESHY_DEFAULT_TARGET_POLYCOUNT` | `30000`                              |
    /// | `MESHY_DEFAULT_SHOULD_REMESH`    | `true`                               |
    /// | `MESHY_DEFAULT_SHOULD_TEXTURE`   | `true`                               |
    /// | `MESHY_DEFAULT_SAVE_PRE_REMESHED`| `true`                               |
    /// | `MESHY_DEFAULT_CATEGORY`         | `AI生成`                             |
    /// | `MESHY_POLL_INTERVAL`            | `5`                                  |
    /// | `MESHY_REQUEST_TIMEOUT_SECS`     | `30`                                 |
    /// | `MESHY_LOCAL_STORAGE_ENABLED`    | `true`                               |
    /// | `MESHY_STORAGE_DIR`              | `static/meshy`                       |
    /// | `MESHY_NAS_ENABLED`              | `false`                              |
    /// | `MESHY_NAS_PATH`                 | (none)                               |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };
        let hunyuan = hunyuan_config(&env)?;
        let meshy = meshy_config(&env)?;

        let default_interval = [
            hunyuan.has_credentials().then_some(hunyuan.poll_interval),
            meshy.has_credentials().then_some(meshy.poll_interval),
        ]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(FALLBACK_POLL_INTERVAL);

        let concurrency: usize = env.parse("POLL_CONCURRENCY", DEFAULT_POLL_CONCURRENCY)?;
        if concurrency == 0 {
            return Err(ConfigError::Invalid {
                key: "POLL_CONCURRENCY".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let poller = PollerConfig {
            interval: env.secs("POLL_INTERVAL_SECS", default_interval)?,
            concurrency,
        };
        let query_timeout = env.secs("QUERY_TIMEOUT_SECS", DEFAULT_QUERY_TIMEOUT)?;
        let download_timeout = env.secs("DOWNLOAD_TIMEOUT_SECS", DEFAULT_DOWNLOAD_TIMEOUT)?;
        for (key, value) in [
            ("POLL_INTERVAL_SECS", poller.interval),
            ("QUERY_TIMEOUT_SECS", query_timeout),
            ("DOWNLOAD_TIMEOUT_SECS", download_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::Invalid {
                    key: key.to_string(),
                    value: "0".to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
        }

        Ok(Self {
            poller,
            query_timeout,
            download_timeout,
            hunyuan,
            meshy,
        })
    }

    /// Build adapters for every provider that has credentials.
    pub fn build_registry(&self) -> Result<AdapterRegistry, ProviderError> {
        let mut registry = AdapterRegistry::new();

        if self.hunyuan.has_credentials() {
            registry.register(Arc::new(HunyuanAdapter::new(self.hunyuan.clone())?));
        } else {
            tracing::info!("Hunyuan credentials not set, provider disabled");
        }

        if self.meshy.has_credentials() {
            registry.register(Arc::new(MeshyAdapter::new(self.meshy.clone())?));
        } else {
            tracing::info!("Meshy API key not set, provider disabled");
        }

        Ok(registry)
    }
}

fn hunyuan_config<F>(env: &Env<F>) -> Result<HunyuanConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let d = HunyuanConfig::default();
    Ok(HunyuanConfig {
        secret_id: env.string("HUNYUAN_SECRET_ID", &d.secret_id),
        secret_key: env.string("HUNYUAN_SECRET_KEY", &d.secret_key),
        region: env.string("HUNYUAN_REGION", &d.region),
        api_url: env.string("HUNYUAN_API_URL", &d.api_url),
        default_model: env.string("HUNYUAN_DEFAULT_MODEL", &d.default_model),
        default_face_count: env.parse("HUNYUAN_DEFAULT_FACE_COUNT", d.default_face_count)?,
        default_generate_type: env.string(
            "HUNYUAN_DEFAULT_GENERATE_TYPE",
            &d.default_generate_type,
        ),
        default_enable_pbr: env.bool("HUNYUAN_DEFAULT_ENABLE_PBR", d.default_enable_pbr)?,
        default_result_format: env.string(
            "HUNYUAN_DEFAULT_RESULT_FORMAT",
            &d.default_result_format,
        ),
        default_category: env.string("HUNYUAN_DEFAULT_CATEGORY", &d.default_category),
        poll_interval: env.secs("HUNYUAN_POLL_INTERVAL", d.poll_interval)?,
        request_timeout: env.secs("HUNYUAN_REQUEST_TIMEOUT_SECS", d.request_timeout)?,
        download_timeout: d.download_timeout,
        storage: storage_config(env, "HUNYUAN", &d.storage)?,
    })
}

fn meshy_config<F>(env: &Env<F>) -> Result<MeshyConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let d = MeshyConfig::default();
    Ok(MeshyConfig {
        api_key: env.string("MESHY_API_KEY", &d.api_key),
        base_url: env.string("MESHY_BASE_URL", &d.base_url),
        default_ai_model: env.string("MESHY_DEFAULT_AI_MODEL", &d.default_ai_model),
        default_enable_pbr: env.bool("MESHY_DEFAULT_ENABLE_PBR", d.default_enable_pbr)?,
        default_topology: env.string("MESHY_DEFAULT_TOPOLOGY", &d.default_topology),
        default_target_polycount: env.parse(
            "MESHY_DEFAULT_TARGET_POLYCOUNT",
            d.default_target_polycount,
        )?,
        default_should_remesh: env.bool("MESHY_DEFAULT_SHOULD_REMESH", d.default_should_remesh)?,
        default_should_texture: env.bool(
            "MESHY_DEFAULT_SHOULD_TEXTURE",
            d.default_should_texture,
        )?,
        default_save_pre_remeshed: env.bool(
            "MESHY_DEFAULT_SAVE_PRE_REMESHED",
            d.default_save_pre_remeshed,
        )?,
        default_category: env.string("MESHY_DEFAULT_CATEGORY", &d.default_category),
        poll_interval: env.secs("MESHY_POLL_INTERVAL", d.poll_interval)?,
        request_timeout: env.secs("MESHY_REQUEST_TIMEOUT_SECS", d.request_timeout)?,
        download_timeout: d.download_timeout,
        storage: storage_config(env, "MESHY", &d.storage)?,
    })
}

fn storage_config<F>(
    env: &Env<F>,
    prefix: &str,
    defaults: &StorageConfig,
) -> Result<StorageConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let nas_enabled = env.bool(
        &format!("{prefix}_NAS_ENABLED"),
        defaults.nas_dir.is_some(),
    )?;
    let nas_dir = env
        .get(&format!("{prefix}_NAS_PATH"))
        .map(PathBuf::from)
        .or_else(|| defaults.nas_dir.clone())
        .filter(|_| nas_enabled);

    Ok(StorageConfig {
        local_enabled: env.bool(
            &format!("{prefix}_LOCAL_STORAGE_ENABLED"),
            defaults.local_enabled,
        )?,
        storage_dir: env
            .get(&format!("{prefix}_STORAGE_DIR"))
            .map(PathBuf::from)
            .unwrap_or_else(|| defaults.storage_dir.clone()),
        nas_dir,
    })
}

/// Typed accessors over a key lookup. Blank values count as unset.
struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
                key: key.to_string(),
                reason: e.to_string(),
                value,
            }),
        }
    }

    fn bool(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::Invalid {
                    key: key.to_string(),
                    value,
                    reason: "expected a boolean".to_string(),
                }),
            },
        }
    }

    fn secs(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        let secs: u64 = self.parse(key, default.as_secs())?;
        Ok(Duration::from_secs(secs))
    }
}
