use serde_json::{json, Value};

use crate::store::SqliteTaskStore;
use crate::task::{Assignee, Task};
use crate::types::SchedulerError;

/// Outbound mail templates. Concrete template ids come from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailTemplate {
    TaskReminder,
    TaskAssignment,
    TaskRepetition,
}

/// Seam between the schedulers and the mail channel. Implementations are
/// best-effort: a failed dispatch is reported as an error for the caller to
/// log, never retried here.
pub trait Notifier {
    fn send_templated(
        &self,
        to: &[String],
        template: MailTemplate,
        context: &Value,
    ) -> Result<(), SchedulerError>;
}

/// Template ids for the three mails this engine sends.
#[derive(Debug, Clone)]
pub struct MailTemplates {
    pub reminder: String,
    pub assignment: String,
    pub repetition: String,
}

impl MailTemplates {
    fn id_for(&self, template: MailTemplate) -> &str {
        match template {
            MailTemplate::TaskReminder => &self.reminder,
            MailTemplate::TaskAssignment => &self.assignment,
            MailTemplate::TaskRepetition => &self.repetition,
        }
    }
}

/// SendGrid-backed notifier over the send_emails_module crate.
pub struct SendgridNotifier {
    from: String,
    templates: MailTemplates,
}

impl SendgridNotifier {
    pub fn new(from: String, templates: MailTemplates) -> Self {
        Self { from, templates }
    }
}

impl Notifier for SendgridNotifier {
    fn send_templated(
        &self,
        to: &[String],
        template: MailTemplate,
        context: &Value,
    ) -> Result<(), SchedulerError> {
        let params = send_emails_module::SendTemplatedParams {
            to: to.to_vec(),
            from: Some(self.from.clone()),
            template_id: self.templates.id_for(template).to_string(),
            dynamic_template_data: context.clone(),
        };
        send_emails_module::send_templated_email(&params)
            .map(|_| ())
            .map_err(|err| SchedulerError::Notify(err.to_string()))
    }
}

/// Recipient resolution: a team fans out to every member's email, a user is a
/// single recipient, an unassigned task resolves to nobody (and the caller
/// skips the send without erroring).
pub fn resolve_recipient_emails(
    store: &SqliteTaskStore,
    assignee: Option<Assignee>,
) -> Result<Vec<String>, SchedulerError> {
    match assignee {
        Some(Assignee::Team(team_id)) => store.team_member_emails(team_id),
        Some(Assignee::User(user_id)) => Ok(store.user_email(user_id)?.into_iter().collect()),
        None => Ok(Vec::new()),
    }
}

/// Dynamic template payload: the task body plus a deep link back into the
/// frontend.
pub fn task_template_data(
    task: &Task,
    emails: &[String],
    frontend_url: &str,
) -> Result<Value, SchedulerError> {
    let mut task_value = serde_json::to_value(task)?;
    if let Value::Object(map) = &mut task_value {
        map.insert(
            "taskUrl".to_string(),
            json!(format!(
                "{}/tasks?t={}",
                frontend_url.trim_end_matches('/'),
                task.task_unique_id
            )),
        );
        map.insert(
            "endingDateTime".to_string(),
            json!(task.ending_datetime.to_rfc3339()),
        );
    }
    Ok(json!({ "email": emails, "task": task_value }))
}
