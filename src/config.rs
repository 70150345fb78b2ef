use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// 程序配置
///
/// 默认值 → 可选的 TOML 文件（`EXTRACTOR_CONFIG`）→ 环境变量，后者覆盖前者
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    // --- 导航代理 (LLM) 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    // --- 对象存储配置 ---
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub storage_region: String,
    /// 兼容 S3 的自定义端点（如 MinIO）
    pub storage_endpoint: Option<String>,
    // --- 目标站点登录（可选） ---
    pub site_username: Option<String>,
    pub site_password: Option<String>,
    // --- HTTP 服务 ---
    pub api_host: String,
    pub api_port: u16,
    // --- 浏览器 ---
    pub headless: bool,
    /// 设置后连接到已运行的浏览器，而不是启动新实例
    pub browser_debug_port: Option<u16>,
    pub chrome_executable: Option<PathBuf>,
    // --- 提取流程 ---
    pub download_dir: PathBuf,
    pub run_timeout_secs: u64,
    pub max_agent_steps: usize,
    pub rescue_timeout_secs: u64,
    pub rescue_grace_secs: u64,
    /// 同时进行的提取数量
    pub max_concurrent_extractions: usize,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm_api_key: String::new(),
            llm_api_base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            llm_model_name: "gemini-2.0-flash".to_string(),
            aws_access_key_id: None,
            aws_secret_access_key: None,
            storage_region: "us-east-1".to_string(),
            storage_endpoint: None,
            site_username: None,
            site_password: None,
            api_host: "0.0.0.0".to_string(),
            api_port: 8000,
            headless: true,
            browser_debug_port: None,
            chrome_executable: None,
            download_dir: PathBuf::from("./downloads"),
            run_timeout_secs: 120,
            max_agent_steps: 40,
            rescue_timeout_secs: 15,
            rescue_grace_secs: 5,
            max_concurrent_extractions: 1,
            verbose_logging: false,
        }
    }
}

impl Config {
    /// 从环境变量加载配置
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// 加载配置：若设置了 `EXTRACTOR_CONFIG` 则先读取 TOML 文件
    pub fn load() -> Result<Self, ConfigError> {
        let base = match std::env::var("EXTRACTOR_CONFIG") {
            Ok(path) if !path.is_empty() => Self::from_file(Path::new(&path))?,
            _ => Self::default(),
        };
        Ok(base.with_env_overrides())
    }

    /// 从 TOML 文件加载配置，缺失的字段使用默认值
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileLoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::FileLoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    fn with_env_overrides(self) -> Self {
        let d = self;
        Self {
            llm_api_key: env_string("LLM_API_KEY")
                .or_else(|| env_string("GEMINI_API_KEY"))
                .unwrap_or(d.llm_api_key),
            llm_api_base_url: env_string("LLM_API_BASE_URL").unwrap_or(d.llm_api_base_url),
            llm_model_name: env_string("LLM_MODEL_NAME").unwrap_or(d.llm_model_name),
            aws_access_key_id: env_string("AWS_ACCESS_KEY_ID").or(d.aws_access_key_id),
            aws_secret_access_key: env_string("AWS_SECRET_ACCESS_KEY").or(d.aws_secret_access_key),
            storage_region: env_string("AWS_REGION").unwrap_or(d.storage_region),
            storage_endpoint: env_string("STORAGE_ENDPOINT").or(d.storage_endpoint),
            site_username: env_string("SITE_USERNAME").or(d.site_username),
            site_password: env_string("SITE_PASSWORD").or(d.site_password),
            api_host: env_string("API_HOST").unwrap_or(d.api_host),
            api_port: env_parse("API_PORT").unwrap_or(d.api_port),
            headless: env_parse("BROWSER_HEADLESS").unwrap_or(d.headless),
            browser_debug_port: env_parse("BROWSER_DEBUG_PORT").or(d.browser_debug_port),
            chrome_executable: env_string("CHROME_EXECUTABLE")
                .map(PathBuf::from)
                .or(d.chrome_executable),
            download_dir: env_string("DOWNLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(d.download_dir),
            run_timeout_secs: env_parse("RUN_TIMEOUT_SECS").unwrap_or(d.run_timeout_secs),
            max_agent_steps: env_parse("MAX_AGENT_STEPS").unwrap_or(d.max_agent_steps),
            rescue_timeout_secs: env_parse("RESCUE_TIMEOUT_SECS").unwrap_or(d.rescue_timeout_secs),
            rescue_grace_secs: env_parse("RESCUE_GRACE_SECS").unwrap_or(d.rescue_grace_secs),
            max_concurrent_extractions: env_parse("MAX_CONCURRENT_EXTRACTIONS")
                .unwrap_or(d.max_concurrent_extractions),
            verbose_logging: env_parse("VERBOSE_LOGGING").unwrap_or(d.verbose_logging),
        }
    }

    /// 导航代理的凭据必须存在，否则在创建浏览器之前就失败
    pub fn require_agent_credentials(&self) -> Result<(), ConfigError> {
        if self.llm_api_key.trim().is_empty() {
            return Err(ConfigError::missing("LLM_API_KEY"));
        }
        Ok(())
    }

    /// 对象存储凭据，缺失任一项即失败
    pub fn require_storage_credentials(&self) -> Result<(&str, &str), ConfigError> {
        let key_id = self
            .aws_access_key_id
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigError::missing("AWS_ACCESS_KEY_ID"))?;
        let secret = self
            .aws_secret_access_key
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigError::missing("AWS_SECRET_ACCESS_KEY"))?;
        Ok((key_id, secret))
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    pub fn rescue_timeout(&self) -> Duration {
        Duration::from_secs(self.rescue_timeout_secs)
    }

    pub fn rescue_grace(&self) -> Duration {
        Duration::from_secs(self.rescue_grace_secs)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_agent_credential() {
        let config = Config::default();
        let err = config.require_agent_credentials().unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential { ref var_name } if var_name == "LLM_API_KEY"));

        let config = Config {
            llm_api_key: "key".into(),
            ..Config::default()
        };
        assert!(config.require_agent_credentials().is_ok());
    }

    #[test]
    fn test_storage_credentials() {
        let config = Config {
            aws_access_key_id: Some("id".into()),
            ..Config::default()
        };
        assert!(matches!(
            config.require_storage_credentials(),
            Err(ConfigError::MissingCredential { ref var_name }) if var_name == "AWS_SECRET_ACCESS_KEY"
        ));

        let config = Config {
            aws_access_key_id: Some("id".into()),
            aws_secret_access_key: Some("secret".into()),
            ..Config::default()
        };
        assert_eq!(config.require_storage_credentials().unwrap(), ("id", "secret"));
    }

    #[test]
    fn test_from_file_keeps_defaults_for_missing_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "api_port = 9100\nheadless = false\ndownload_dir = \"/tmp/pdfs\"").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.api_port, 9100);
        assert!(!config.headless);
        assert_eq!(config.download_dir, PathBuf::from("/tmp/pdfs"));
        assert_eq!(config.run_timeout_secs, 120);
        assert_eq!(config.storage_region, "us-east-1");
    }

    #[test]
    fn test_from_file_rejects_bad_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "api_port = \"not a number\"").unwrap();
        assert!(matches!(
            Config::from_file(file.path()),
            Err(ConfigError::FileLoadFailed { .. })
        ));
    }

    #[test]
    fn test_bind_address() {
        assert_eq!(Config::default().bind_address(), "0.0.0.0:8000");
    }
}
