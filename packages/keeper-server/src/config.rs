//! Server configuration, environment-first with flag overrides.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "keeperd", version, about = "Keeper secret manager server")]
pub struct Args {
    /// Listen address
    #[arg(long, default_value = "localhost:8081", env = "ADDRESS")]
    pub address: String,

    /// SQLite database path (":memory:" for an ephemeral store)
    #[arg(long, env = "DB_DSN")]
    pub db_dsn: String,

    /// Log filter (debug|info|warn|error, or any tracing filter directive)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    pub log_level: String,

    /// HS256 signing key for access tokens
    #[arg(long, env = "ACCESS_SECRET", hide_env_values = true)]
    pub access_secret: String,

    /// HS256 signing key for refresh tokens
    #[arg(long, env = "REFRESH_SECRET", hide_env_values = true)]
    pub refresh_secret: String,

    /// Path to the PKCS8 PEM RSA private key unwrapping the encryption key
    #[arg(long, env = "MASTER_KEY")]
    pub master_key: PathBuf,

    /// Path to the AES encryption key wrapped under the RSA public key
    #[arg(long, env = "ENCRYPTED_KEY")]
    pub encrypted_key: PathBuf,

    /// S3-compatible endpoint URL
    #[arg(long, default_value = "http://localhost:9000", env = "S3_ENDPOINT")]
    pub s3_endpoint: String,

    /// Object store access key
    #[arg(long, env = "S3_ACCESS_KEY")]
    pub s3_access_key: String,

    /// Object store secret key
    #[arg(long, env = "S3_SECRET_KEY", hide_env_values = true)]
    pub s3_secret_key: String,

    /// Bucket holding binary chunks
    #[arg(long, default_value = "binaries", env = "S3_BUCKET")]
    pub s3_bucket: String,

    /// Region label for the object store client
    #[arg(long, default_value = "us-east-1", env = "S3_REGION")]
    pub s3_region: String,

    /// Orphan-chunk reaper interval in seconds (0 disables)
    #[arg(long, default_value_t = 300, env = "REAPER_INTERVAL_SECS")]
    pub reaper_interval_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from([
            "keeperd",
            "--db-dsn",
            ":memory:",
            "--access-secret",
            "a",
            "--refresh-secret",
            "r",
            "--master-key",
            "/keys/master.pem",
            "--encrypted-key",
            "/keys/kek.bin",
            "--s3-access-key",
            "minio",
            "--s3-secret-key",
            "minio123",
        ]);

        assert_eq!(args.address, "localhost:8081");
        assert_eq!(args.s3_bucket, "binaries");
        assert_eq!(args.log_level, "info");
        assert_eq!(args.reaper_interval_secs, 300);
    }

    #[test]
    fn test_missing_required_values_fail() {
        let result = Args::try_parse_from(["keeperd"]);
        assert!(result.is_err());
    }
}
