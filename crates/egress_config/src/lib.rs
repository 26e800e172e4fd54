use serde::Deserialize;

// =======================================================
// GLOBAL CONFIG + DEFAULTS
// =======================================================
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub log_level: String,
    pub server_name: String,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            server_name: "egress/0.1.0".into(),
        }
    }
}

impl GlobalConfig {
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }
}

// =======================================================
// HTTP CONFIG + DEFAULTS
// =======================================================
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub listen: String,

    // Timeouts (seconds)
    pub client_read_timeout_secs: u64,
    pub keepalive_timeout_secs: u64,

    // Limits (bytes)
    pub max_request_headers_bytes: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".into(),
            client_read_timeout_secs: 15,
            keepalive_timeout_secs: 65,
            max_request_headers_bytes: 64 * 1024,
        }
    }
}

impl HttpConfig {
    pub fn listen(&self) -> &str {
        &self.listen
    }

    pub fn client_read_timeout_secs(&self) -> u64 {
        self.client_read_timeout_secs
    }

    pub fn keepalive_timeout_secs(&self) -> u64 {
        self.keepalive_timeout_secs
    }

    pub fn max_request_headers_bytes(&self) -> u64 {
        self.max_request_headers_bytes
    }
}

// =======================================================
// RESPONSE CONFIG + DEFAULTS
// =======================================================
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ResponseConfig {
    /// Enable content-encoding negotiation (gzip/deflate).
    pub compression: bool,
    /// flate2 compression level (0-9).
    pub compression_level: u32,
    /// Default for merging payload-source headers into responses.
    pub pass_through: bool,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            compression: true,
            compression_level: 6,
            pass_through: true,
        }
    }
}

impl ResponseConfig {
    pub fn compression(&self) -> bool {
        self.compression
    }

    pub fn compression_level(&self) -> u32 {
        self.compression_level
    }

    pub fn pass_through(&self) -> bool {
        self.pass_through
    }
}

// =======================================================
// EGRESS CONFIG — main config
// =======================================================
#[derive(Debug, Deserialize, Default)]
pub struct EgressConfig {
    #[serde(default)]
    pub global: GlobalConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub response: ResponseConfig,
}

impl EgressConfig {
    pub fn global(&self) -> &GlobalConfig {
        &self.global
    }

    pub fn http(&self) -> &HttpConfig {
        &self.http
    }

    pub fn response(&self) -> &ResponseConfig {
        &self.response
    }

    pub fn from_file(file_name: &str) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(file_name)?;
        let mut cfg: EgressConfig = toml::from_str(&raw)?;
        cfg.apply_defaults();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file_or_default(file_name: &str) -> Self {
        match Self::from_file(file_name) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("⚠️  Error reading config '{file_name}': {e}");
                eprintln!("➡️  Using default config (in-memory)...");
                EgressConfig::default()
            }
        }
    }

    fn apply_defaults(&mut self) {
        let def_global = GlobalConfig::default();
        if self.global.log_level.is_empty() {
            self.global.log_level = def_global.log_level.clone();
        }
        if self.global.server_name.is_empty() {
            self.global.server_name = def_global.server_name.clone();
        }

        let def_http = HttpConfig::default();
        if self.http.listen.is_empty() {
            self.http.listen = def_http.listen.clone();
        }
        if self.http.client_read_timeout_secs == 0 {
            self.http.client_read_timeout_secs = def_http.client_read_timeout_secs;
        }
        if self.http.keepalive_timeout_secs == 0 {
            self.http.keepalive_timeout_secs = def_http.keepalive_timeout_secs;
        }
        if self.http.max_request_headers_bytes == 0 {
            self.http.max_request_headers_bytes = def_http.max_request_headers_bytes;
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.http.listen.parse::<std::net::SocketAddr>().is_err() {
            anyhow::bail!("http.listen is not a valid socket address: {}", self.http.listen);
        }
        if self.response.compression_level > 9 {
            anyhow::bail!(
                "response.compression_level must be 0-9, got {}",
                self.response.compression_level
            );
        }
        Ok(())
    }

    pub fn print(&self) {
        println!("================ EGRESS CONFIG ================");

        println!("\n[global]");
        println!("  log_level            = {}", self.global.log_level);
        println!("  server_name          = {}", self.global.server_name);

        println!("\n[http]");
        println!("  listen               = {}", self.http.listen);
        println!(
            "  client_read_timeout_secs = {}",
            self.http.client_read_timeout_secs
        );
        println!(
            "  keepalive_timeout_secs   = {}",
            self.http.keepalive_timeout_secs
        );
        println!(
            "  max_request_headers_bytes = {}",
            self.http.max_request_headers_bytes
        );

        println!("\n[response]");
        println!("  compression          = {}", self.response.compression);
        println!("  compression_level    = {}", self.response.compression_level);
        println!("  pass_through         = {}", self.response.pass_through);

        println!("===============================================");
    }
}
