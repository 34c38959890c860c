//! Service configuration
//!
//! Every value can be supplied as a command-line flag or an environment
//! variable. Required values with no default abort startup, so a misconfigured
//! deploy fails immediately instead of at first request.

use clap::{Args, Parser};

/// Sirsi web-services connection settings
#[derive(Args, Debug, Clone)]
pub struct SirsiConfig {
    /// Sirsi web services base URL
    #[arg(long = "sirsiurl", env = "ILS_SIRSI_URL")]
    pub web_services_url: String,

    /// Sirsi script services base URL (course reserve lookups)
    #[arg(long = "sirsiscript", env = "ILS_SIRSI_SCRIPT_URL")]
    pub script_url: String,

    /// Sirsi staff account used for the connector session
    #[arg(id = "sirsi_user", long = "sirsiuser", env = "ILS_SIRSI_USER")]
    pub user: String,

    /// Sirsi staff account password
    #[arg(id = "sirsi_password", long = "sirsipass", env = "ILS_SIRSI_PASS")]
    pub password: String,

    /// Client ID sent as x-sirs-clientID
    #[arg(long = "sirsiclient", env = "ILS_SIRSI_CLIENT_ID")]
    pub client_id: String,

    /// Default working library
    #[arg(long = "sirsilibrary", env = "ILS_SIRSI_LIBRARY", default_value = "UVA-LIB")]
    pub library: String,
}

/// Catalog index (Solr) settings
#[derive(Args, Debug, Clone)]
pub struct SolrConfig {
    /// Solr base URL
    #[arg(long = "solr", env = "ILS_SOLR_URL")]
    pub url: String,

    /// Solr core name
    #[arg(long = "solrcore", env = "ILS_SOLR_CORE", default_value = "test_core")]
    pub core: String,
}

/// Transactional mail relay settings
#[derive(Args, Debug, Clone)]
pub struct SmtpConfig {
    /// SMTP relay host
    #[arg(long = "smtphost", env = "ILS_SMTP_HOST")]
    pub host: String,

    /// SMTP relay port
    #[arg(id = "smtp_port", long = "smtpport", env = "ILS_SMTP_PORT", default_value_t = 25)]
    pub port: u16,

    /// SMTP user; blank for unauthenticated relays
    #[arg(id = "smtp_user", long = "smtpuser", env = "ILS_SMTP_USER", default_value = "")]
    pub user: String,

    /// SMTP password; blank for unauthenticated relays
    #[arg(id = "smtp_password", long = "smtppass", env = "ILS_SMTP_PASS", default_value = "")]
    pub password: String,

    /// From address for connector-originated mail
    #[arg(long = "smtpsender", env = "ILS_SMTP_SENDER")]
    pub sender: String,

    /// Log mail instead of sending it
    #[arg(long = "smtpdevmode", env = "ILS_SMTP_DEV_MODE")]
    pub dev_mode: bool,
}

/// Signing keys for caller and service tokens
#[derive(Args, Debug, Clone)]
pub struct SecretsConfig {
    /// HS256 key used to validate caller JWTs
    #[arg(long = "jwtkey", env = "ILS_JWT_KEY")]
    pub virgo_jwt_key: String,

    /// HS256 key used to mint short-lived user-service tokens
    #[arg(long = "userjwtkey", env = "ILS_USER_JWT_KEY")]
    pub user_jwt_key: String,
}

/// Full connector configuration
#[derive(Parser, Debug, Clone)]
#[command(name = "ils-connector", version, about = "ILS connector service")]
pub struct ServiceConfig {
    /// Service port
    #[arg(long, env = "ILS_PORT", default_value_t = 8080)]
    pub port: u16,

    #[command(flatten)]
    pub sirsi: SirsiConfig,

    #[command(flatten)]
    pub solr: SolrConfig,

    #[command(flatten)]
    pub smtp: SmtpConfig,

    #[command(flatten)]
    pub secrets: SecretsConfig,

    /// Discovery front-end base URL (links in notices and reset mails)
    #[arg(long = "virgo", env = "ILS_VIRGO_URL")]
    pub virgo_url: String,

    /// Patron-driven acquisition service base URL
    #[arg(long = "pda", env = "ILS_PDA_URL")]
    pub pda_url: String,

    /// User-directory service base URL
    #[arg(long = "userinfo", env = "ILS_USER_INFO_URL")]
    pub user_info_url: String,

    /// Health-sciences ILL (OpenURL) endpoint
    #[arg(long = "hsilliad", env = "ILS_HS_ILLIAD_URL")]
    pub hs_illiad_url: String,

    /// Course reserves mailbox
    #[arg(long = "cremail", env = "ILS_COURSE_RESERVE_EMAIL")]
    pub course_reserve_email: String,

    /// Law-library course reserves mailbox
    #[arg(long = "lawemail", env = "ILS_LAW_RESERVE_EMAIL")]
    pub law_reserve_email: String,

    /// Patron barcode of the scan fulfillment account
    #[arg(long = "scanbarcode", env = "ILS_SCAN_BARCODE", default_value = "999999462")]
    pub scan_barcode: String,

    /// Working library for scan requests
    #[arg(long = "scanlibrary", env = "ILS_SCAN_LIBRARY", default_value = "LEO")]
    pub scan_library: String,

    /// Directory holding the static policy data files
    #[arg(long = "datadir", env = "ILS_DATA_DIR", default_value = "./data")]
    pub data_dir: String,
}

impl ServiceConfig {
    /// Log the non-secret settings the way operators expect to see them
    pub fn log_settings(&self) {
        tracing::info!("[CONFIG] port         = [{}]", self.port);
        tracing::info!("[CONFIG] sirsiurl     = [{}]", self.sirsi.web_services_url);
        tracing::info!("[CONFIG] sirsiscript  = [{}]", self.sirsi.script_url);
        tracing::info!("[CONFIG] sirsiuser    = [{}]", self.sirsi.user);
        tracing::info!("[CONFIG] sirsiclient  = [{}]", self.sirsi.client_id);
        tracing::info!("[CONFIG] sirsilibrary = [{}]", self.sirsi.library);
        tracing::info!("[CONFIG] solr         = [{}/{}]", self.solr.url, self.solr.core);
        tracing::info!("[CONFIG] virgo        = [{}]", self.virgo_url);
        tracing::info!("[CONFIG] pda          = [{}]", self.pda_url);
        tracing::info!("[CONFIG] userinfo     = [{}]", self.user_info_url);
        tracing::info!("[CONFIG] hsilliad     = [{}]", self.hs_illiad_url);
        tracing::info!("[CONFIG] datadir      = [{}]", self.data_dir);
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> ServiceConfig {
    ServiceConfig::parse_from([
        "ils-connector",
        "--sirsiurl", "http://sirsi.example.com",
        "--sirsiscript", "http://sirsi.example.com/scripts",
        "--sirsiuser", "staff",
        "--sirsipass", "secret",
        "--sirsiclient", "TEST_CLIENT",
        "--solr", "http://solr.example.com",
        "--smtphost", "smtp.example.com",
        "--smtpsender", "noreply@example.com",
        "--smtpdevmode",
        "--jwtkey", "test-caller-signing-key",
        "--userjwtkey", "test-user-signing-key",
        "--virgo", "https://search.example.com",
        "--pda", "http://pda.example.com",
        "--userinfo", "http://userinfo.example.com",
        "--hsilliad", "https://hsl.example.com",
        "--cremail", "reserves@example.com",
        "--lawemail", "lawreserves@example.com",
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied() {
        let cfg = test_config();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.sirsi.library, "UVA-LIB");
        assert_eq!(cfg.scan_library, "LEO");
        assert!(cfg.smtp.dev_mode);
    }
}
