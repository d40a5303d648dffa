mod forms;
mod meta;
mod views;

pub use forms::SecureForm;
pub use meta::{Meta, Page, ViewerMeta};
pub use views::{
    error_404, flash_and_redirect, flash_outcome, template_to_response, HtmlError, HtmlResult,
};
