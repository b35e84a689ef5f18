use clap::{Parser, Subcommand, ValueEnum};
use lm_types::entities::ConfigurationType;

/// Mirrors [`ConfigurationType`] for `clap`'s derive — `ValueEnum` can't be implemented
/// directly on a type from another crate (the orphan rule), so the CLI carries its own
/// copy of the variant list and converts at the request boundary.
#[derive(Debug, Clone, Copy, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum ConfigurationKindArg {
    Flexlm,
    Rlm,
    Lsdyna,
    Lmx,
    Olicense,
}

impl From<ConfigurationKindArg> for ConfigurationType {
    fn from(value: ConfigurationKindArg) -> Self {
        match value {
            ConfigurationKindArg::Flexlm => ConfigurationType::Flexlm,
            ConfigurationKindArg::Rlm => ConfigurationType::Rlm,
            ConfigurationKindArg::Lsdyna => ConfigurationType::Lsdyna,
            ConfigurationKindArg::Lmx => ConfigurationType::Lmx,
            ConfigurationKindArg::Olicense => ConfigurationType::Olicense,
        }
    }
}

/// Command line arguments for the license-token ledger operator CLI.
#[derive(Parser, Debug)]
#[clap(name = "lm", about = "Operator CLI for the license-token ledger")]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, env = "BACKEND_BASE_URL", global = true)]
    pub backend_base_url: String,

    #[arg(long, env = "AUTH0_DOMAIN", global = true)]
    pub auth0_domain: String,

    #[arg(long, env = "AUTH0_AUDIENCE", global = true)]
    pub auth0_audience: String,

    #[arg(long, env = "AUTH0_CLIENT_ID", global = true)]
    pub auth0_client_id: String,

    #[arg(long, env = "AUTH0_CLIENT_SECRET", global = true)]
    pub auth0_client_secret: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage cluster configurations
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Manage features and their inventory
    Feature {
        #[command(subcommand)]
        command: FeatureCommands,
    },
    /// Manage license servers
    LicenseServer {
        #[command(subcommand)]
        command: LicenseServerCommands,
    },
    /// Manage bookings
    Booking {
        #[command(subcommand)]
        command: BookingCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Create a configuration
    Create {
        name: String,
        #[arg(long)]
        cluster_id: i64,
        #[arg(long, value_enum)]
        kind: ConfigurationKindArg,
        #[arg(long, default_value_t = 0)]
        grace_time: i64,
    },
    /// Update a configuration
    Update {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        cluster_id: Option<i64>,
        #[arg(long, value_enum)]
        kind: Option<ConfigurationKindArg>,
        #[arg(long)]
        grace_time: Option<i64>,
    },
    /// List configurations
    List,
}

#[derive(Subcommand, Debug)]
pub enum FeatureCommands {
    /// Create a feature
    Create {
        name: String,
        #[arg(long)]
        product_id: i64,
        #[arg(long)]
        config_id: i64,
        #[arg(long, default_value_t = 0)]
        reserved: i64,
    },
    /// Update a feature
    Update {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        product_id: Option<i64>,
        #[arg(long)]
        config_id: Option<i64>,
        #[arg(long)]
        reserved: Option<i64>,
    },
    /// List features
    List,
    /// Set a feature's inventory totals
    SetInventory {
        id: i64,
        #[arg(long)]
        total: Option<i64>,
        #[arg(long)]
        used: Option<i64>,
    },
}

#[derive(Subcommand, Debug)]
pub enum LicenseServerCommands {
    /// Create a license server
    Create {
        #[arg(long)]
        config_id: i64,
        #[arg(long)]
        host: String,
        #[arg(long)]
        port: u16,
    },
    /// Update a license server
    Update {
        id: i64,
        #[arg(long)]
        config_id: Option<i64>,
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// List license servers
    List,
}

#[derive(Subcommand, Debug)]
pub enum BookingCommands {
    /// Create a booking
    Create {
        #[arg(long)]
        job_id: i64,
        #[arg(long)]
        feature_id: i64,
        #[arg(long)]
        quantity: i64,
    },
    /// List bookings
    List,
    /// Delete a booking
    Delete { id: i64 },
}
