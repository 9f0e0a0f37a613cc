use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::notify::MailTemplates;

const DEFAULT_DAILY_CRON: &str = "0 0 0 * * *";

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub db_path: PathBuf,
    pub frontend_url: String,
    pub mail_from: String,
    pub templates: MailTemplates,
    pub daily_cron: String,
    pub poll_interval: Duration,
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let db_path = env::var("TASKMGR_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("state/taskmgr.db"));
        let frontend_url =
            env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
        let mail_from =
            env::var("MAIL_FROM").unwrap_or_else(|_| "no-reply@taskmgr.local".to_string());
        let templates = MailTemplates {
            reminder: env::var("SENDGRID_TEMPLATE_TASK_REMINDER")
                .unwrap_or_else(|_| "d-task-reminder".to_string()),
            assignment: env::var("SENDGRID_TEMPLATE_TASK_ASSIGNMENT")
                .unwrap_or_else(|_| "d-task-assignment".to_string()),
            repetition: env::var("SENDGRID_TEMPLATE_TASK_REPETITION")
                .unwrap_or_else(|_| "d-task-repetition".to_string()),
        };
        let daily_cron =
            env::var("SCHEDULER_DAILY_CRON").unwrap_or_else(|_| DEFAULT_DAILY_CRON.to_string());
        let poll_interval = env::var("SCHEDULER_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(60));

        Self {
            db_path,
            frontend_url,
            mail_from,
            templates,
            daily_cron,
            poll_interval,
        }
    }
}
