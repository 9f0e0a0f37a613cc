use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{error, info};

use scheduler_module::{DailyRunner, SendgridNotifier, ServiceConfig, SqliteTaskStore};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().init();

    let config = ServiceConfig::from_env();
    info!(
        "taskmgr scheduler starting (db: {}, cron: {})",
        config.db_path.display(),
        config.daily_cron
    );

    let store = match SqliteTaskStore::new(&config.db_path) {
        Ok(store) => store,
        Err(err) => {
            error!("failed to open task store: {}", err);
            std::process::exit(1);
        }
    };
    let notifier = SendgridNotifier::new(config.mail_from.clone(), config.templates.clone());

    let stop_flag = Arc::new(AtomicBool::new(false));
    let signal_flag = stop_flag.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            signal_flag.store(true, Ordering::Relaxed);
        }
    });

    let poll_interval = config.poll_interval;
    let result = tokio::task::spawn_blocking(move || {
        let mut runner = DailyRunner::new(
            &store,
            &notifier,
            &config.frontend_url,
            &config.daily_cron,
        )?;
        info!("next daily run at {}", runner.next_run());
        runner.run_loop(poll_interval, &stop_flag);
        Ok::<(), scheduler_module::SchedulerError>(())
    })
    .await;

    match result {
        Ok(Ok(())) => info!("scheduler stopped"),
        Ok(Err(err)) => {
            error!("scheduler failed: {}", err);
            std::process::exit(1);
        }
        Err(err) => {
            error!("scheduler task panicked: {}", err);
            std::process::exit(1);
        }
    }
}
