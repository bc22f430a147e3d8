use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::{error, info};

use crawldeck_api::AppState;
use crawldeck_core::models::ALL_CHANNELS;
use crawldeck_core::AppConfig;
use crawldeck_engine::{
    BatchSweeper, EventIngestor, HealthSampler, StatisticsReconciler, StuckTaskRepairer,
};
use crawldeck_infrastructure::{
    create_pool, HttpDependencyProber, PostgresResultRows, PostgresScheduleRepository,
    PostgresTaskRepository, RedisEventBus, ResultLocator, SysinfoProcessProbe, SystemMetrics,
};
use crawldeck_realtime::Broadcaster;

/// 运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    /// 只跑后台引擎循环
    Engine,
    /// 只跑管理API
    Api,
    /// 引擎和API在同一进程
    All,
}

/// 应用实例：装配好全部组件，按模式拉起对应的循环
pub struct Application {
    config: AppConfig,
    mode: AppMode,
    event_bus: Arc<RedisEventBus>,
    broadcaster: Arc<Broadcaster>,
    sweeper: Arc<BatchSweeper>,
    repairer: Arc<StuckTaskRepairer>,
    ingestor: Arc<EventIngestor>,
    sampler: Arc<HealthSampler>,
}

impl Application {
    pub async fn new(config: AppConfig, mode: AppMode) -> Result<Self> {
        info!("装配应用组件 (模式: {:?})", mode);

        let pool = create_pool(&config.database)
            .await
            .context("创建数据库连接池失败")?;
        let task_repo = Arc::new(PostgresTaskRepository::new(pool.clone()));
        let row_counter = Arc::new(PostgresResultRows::new(pool.clone()));
        let schedule_repo = Arc::new(PostgresScheduleRepository::new(pool));

        let event_bus = Arc::new(
            RedisEventBus::connect(&config.event_bus, &ALL_CHANNELS)
                .await
                .context("连接事件总线失败")?,
        );

        let locator = Arc::new(ResultLocator::new(&config.results));
        let probe = Arc::new(SysinfoProcessProbe::new(Duration::from_secs(
            config.health.probe_timeout_seconds,
        )));
        let prober = Arc::new(HttpDependencyProber::new(Duration::from_secs(
            config.health.probe_timeout_seconds,
        )));
        let broadcaster = Arc::new(Broadcaster::new(config.realtime.clone()));

        let reconciler = Arc::new(StatisticsReconciler::new(
            task_repo.clone(),
            row_counter,
            locator.clone(),
            broadcaster.clone(),
            config.reconciler.short_task_floor_seconds,
        ));
        let sweeper = Arc::new(BatchSweeper::new(
            task_repo.clone(),
            reconciler.clone(),
            config.sweeper.clone(),
        ));
        let repairer = Arc::new(StuckTaskRepairer::new(
            task_repo.clone(),
            probe,
            locator,
            broadcaster.clone(),
            config.repairer.clone(),
        ));
        let ingestor = Arc::new(EventIngestor::new(
            task_repo.clone(),
            event_bus.clone(),
            broadcaster.clone(),
            config.event_bus.clone(),
        ));
        let sampler = Arc::new(HealthSampler::new(
            task_repo,
            schedule_repo,
            event_bus.clone(),
            prober,
            Arc::new(SystemMetrics::new()),
            reconciler,
            broadcaster.clone(),
            config.health.clone(),
        ));

        Ok(Self {
            config,
            mode,
            event_bus,
            broadcaster,
            sweeper,
            repairer,
            ingestor,
            sampler,
        })
    }

    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        match self.mode {
            AppMode::Engine => self.run_engine(shutdown_rx).await,
            AppMode::Api => self.run_api(shutdown_rx).await,
            AppMode::All => self.run_all(shutdown_rx).await,
        }
    }

    /// 拉起全部后台引擎循环并等它们退出
    async fn run_engine(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("启动引擎循环");
        let mut handles = Vec::new();

        handles.push(tokio::spawn(
            self.ingestor.clone().run_loop(shutdown_rx.resubscribe()),
        ));
        handles.push(tokio::spawn(
            self.sweeper.clone().run_loop(shutdown_rx.resubscribe()),
        ));
        handles.push(tokio::spawn(
            self.repairer.clone().run_loop(shutdown_rx.resubscribe()),
        ));
        handles.push(tokio::spawn(
            self.sampler.clone().run_loop(shutdown_rx.resubscribe()),
        ));
        handles.push(tokio::spawn(
            self.broadcaster
                .clone()
                .run_sweep_loop(shutdown_rx.resubscribe()),
        ));

        for handle in handles {
            if let Err(e) = handle.await {
                error!("引擎循环异常退出: {e}");
            }
        }

        self.event_bus.shutdown().await;
        info!("引擎循环已全部退出");
        Ok(())
    }

    async fn run_api(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let state = AppState {
            sweeper: self.sweeper.clone(),
            sampler: self.sampler.clone(),
            repairer: self.repairer.clone(),
            broadcaster: self.broadcaster.clone(),
        };
        crawldeck_api::serve(
            state,
            &self.config.api.bind_address,
            self.config.api.cors_enabled,
            shutdown_rx,
        )
        .await
    }

    async fn run_all(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let engine_rx = shutdown_rx.resubscribe();
        let api_rx = shutdown_rx.resubscribe();

        let (engine_result, api_result) =
            tokio::join!(self.run_engine(engine_rx), self.run_api(api_rx));
        engine_result?;
        api_result?;
        Ok(())
    }
}
