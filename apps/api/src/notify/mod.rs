pub mod mailer;
pub mod templates;

pub use mailer::{Email, MailError, Mailer, ResendMailer};
