//! Prompt and instruction rendering.

use std::path::Path;

use minijinja::{Environment, context};

use crate::error::Result;

const REVIEW_TEMPLATE: &str = include_str!("prompts/review.md");
const MANUAL_TEMPLATE: &str = include_str!("prompts/manual.md");

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_keep_trailing_newline(true);
        env.add_template("review", REVIEW_TEMPLATE)
            .expect("review template should be valid");
        env.add_template("manual", MANUAL_TEMPLATE)
            .expect("manual template should be valid");
        Self { env }
    }

    /// Render the review request sent alongside the bundle.
    pub fn render_review(&self, message: &str) -> Result<String> {
        let template = self.env.get_template("review")?;
        Ok(template.render(context! { message => message.trim() })?)
    }

    /// Render the instructions printed in manual mode.
    pub fn render_manual(
        &self,
        bundle_path: &Path,
        prompt_path: &Path,
        response_path: &Path,
        stdin: bool,
    ) -> Result<String> {
        let template = self.env.get_template("manual")?;
        Ok(template.render(context! {
            bundle_path => bundle_path.display().to_string(),
            prompt_path => prompt_path.display().to_string(),
            response_path => response_path.display().to_string(),
            stdin => stdin,
        })?)
    }
}
