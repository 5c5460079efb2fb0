//! Bundled instruction templates for the gate and the execution step.
//!
//! Templates are embedded in the binary using include_str! and rendered
//! with minijinja.

use minijinja::{context, Environment};
use once_cell::sync::Lazy;

use crate::catalog::CLARIFICATION_ACTION;
use crate::collaborators::ActionDescriptor;

/// Bundled gate instructions template.
pub const GATE_TEMPLATE: &str = include_str!("../templates/gate.j2");

/// Bundled executor instructions template.
pub const EXECUTOR_TEMPLATE: &str = include_str!("../templates/executor.j2");

static ENV: Lazy<Environment<'static>> = Lazy::new(|| {
    let mut env = Environment::new();
    env.add_template("gate", GATE_TEMPLATE)
        .expect("bundled gate template is valid");
    env.add_template("executor", EXECUTOR_TEMPLATE)
        .expect("bundled executor template is valid");
    env
});

/// Render the catalog gate instructions for the known category set.
pub fn gate_instructions(categories: &[String]) -> Result<String, minijinja::Error> {
    ENV.get_template("gate")?
        .render(context! { categories => categories })
}

/// Render the execution step instructions for the resolved action set.
pub fn executor_instructions(actions: &[ActionDescriptor]) -> Result<String, minijinja::Error> {
    ENV.get_template("executor")?.render(context! {
        actions => actions,
        clarification_action => CLARIFICATION_ACTION,
    })
}
