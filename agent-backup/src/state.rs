use crate::builder::SnapshotBuilder;
use crate::catalog::Catalog;
use crate::config::{Config, Layout};
use crate::restore::Restorer;
use crate::schedule::ScheduleReconciler;
use crate::store::RetentionStore;
use crate::tools::{
    Archiver, CrontabMirror, SchedulerMirror, ServiceManager, SystemdGateway, TarArchiver,
};
use crate::utils::errors::Result;
use std::sync::Arc;

/// Every engine component, wired once at startup and shared by the API and CLI.
pub struct AppState {
    pub config: Config,
    pub layout: Layout,
    pub catalog: Arc<Catalog>,
    pub builder: Arc<SnapshotBuilder>,
    pub restorer: Arc<Restorer>,
    pub schedules: Arc<ScheduleReconciler>,
}

impl AppState {
    pub fn new(
        config: Config,
        archiver: Arc<dyn Archiver>,
        mirror: Arc<dyn SchedulerMirror>,
        services: Arc<dyn ServiceManager>,
    ) -> Result<Self> {
        let layout = config.layout();
        std::fs::create_dir_all(&layout.backups_dir)?;
        std::fs::create_dir_all(&layout.cron_dir)?;

        let retention = Arc::new(RetentionStore::open(layout.retention_file()));
        let catalog = Arc::new(Catalog::new(layout.backups_dir.clone(), retention));
        let schedules = Arc::new(ScheduleReconciler::new(&config, &layout, mirror));
        let builder = Arc::new(SnapshotBuilder::new(
            layout.data_root.clone(),
            catalog.clone(),
            archiver.clone(),
        ));
        let restorer = Arc::new(Restorer::new(
            layout.data_root.clone(),
            catalog.clone(),
            archiver,
            services,
            schedules.clone(),
        ));

        Ok(Self {
            config,
            layout,
            catalog,
            builder,
            restorer,
            schedules,
        })
    }

    /// State backed by the real `tar`, `crontab`, `chown` and `systemctl` binaries.
    pub fn production(config: Config) -> Result<Self> {
        let timeout = config.tool_timeout();
        let archiver = Arc::new(TarArchiver::new(config.tools.tar.clone(), timeout));
        let mirror = Arc::new(CrontabMirror::new(config.tools.crontab.clone(), timeout));
        let services = Arc::new(SystemdGateway::from_config(&config));
        Self::new(config, archiver, mirror, services)
    }
}
