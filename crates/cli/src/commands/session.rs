//! Engine construction shared by the commands that talk to S3

use std::sync::Arc;

use awss_core::{
    AwsPaths, Config, ConfigManager, CredentialFingerprint, Engine, ProfileSet, Result,
    SsoPreflight,
};
use awss_s3::{S3Storage, SsoAuth};

/// Profile selection from the global flags
#[derive(Debug, Clone, Default)]
pub struct SessionArgs {
    pub profiles: Vec<String>,
    pub profile: Vec<String>,
    pub region: Option<String>,
}

impl SessionArgs {
    /// Explicit profile names, `--profiles` first
    fn explicit_profiles(&self) -> Vec<String> {
        self.profiles.iter().chain(&self.profile).cloned().collect()
    }

    /// Profile preferred when several qualify equally
    fn pinned(&self) -> Option<String> {
        self.profile
            .iter()
            .map(|p| p.trim())
            .find(|p| !p.is_empty())
            .map(str::to_string)
    }
}

/// An engine plus the preferences it was built from
pub struct Session {
    pub engine: Engine,
    pub config: Config,
    pub config_manager: ConfigManager,
}

impl Session {
    pub fn open(args: &SessionArgs) -> Result<Self> {
        let config_manager = ConfigManager::new()?;
        let config = config_manager.load()?;
        let paths = AwsPaths::from_env()?;
        Self::open_with(args, config_manager, config, paths)
    }

    pub fn open_with(
        args: &SessionArgs,
        config_manager: ConfigManager,
        config: Config,
        paths: AwsPaths,
    ) -> Result<Self> {
        let profiles = select_profiles(args, &config, &paths);
        tracing::debug!(profiles = ?profiles.names(), "Using profiles");

        let sso = SsoPreflight::new(paths.clone());
        let fingerprint = CredentialFingerprint::new(&paths).compute();

        let engine = Engine::builder(
            profiles,
            Arc::new(S3Storage::new()),
            Arc::new(SsoAuth::new(sso.clone())),
        )
        .cache_path(config_manager.cache_path())
        .fingerprint(fingerprint)
        .settings(config.engine.clone())
        .pinned(args.pinned())
        .sso(sso)
        .build()?;

        Ok(Self {
            engine,
            config,
            config_manager,
        })
    }
}

/// Flags win over the configured list, which wins over discovery
fn select_profiles(args: &SessionArgs, config: &Config, paths: &AwsPaths) -> ProfileSet {
    let region = args.region.clone().or_else(|| config.engine.region.clone());
    let explicit = args.explicit_profiles();
    if explicit.iter().any(|p| !p.trim().is_empty()) {
        return ProfileSet::from_names(explicit, region);
    }
    if !config.engine.profiles.is_empty() {
        return ProfileSet::from_names(&config.engine.profiles, region);
    }
    ProfileSet::discover(paths, region)
}
