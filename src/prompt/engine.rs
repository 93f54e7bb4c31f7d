use tera::Tera;

use crate::error::PromptError;

/// Tera-backed template engine for building structured prompts.
pub struct TeraEngine {
    tera: Tera,
}

impl TeraEngine {
    /// Create with inline templates (no filesystem).
    pub fn new() -> Self {
        Self { tera: Tera::default() }
    }

    /// Register a template from a string.
    pub fn add_template(&mut self, name: &str, content: &str) -> Result<(), PromptError> {
        self.tera.add_raw_template(name, content)?;
        Ok(())
    }

    /// Render a named, registered template with the given context.
    pub fn render(&self, template_name: &str, context: &tera::Context) -> Result<String, PromptError> {
        self.tera.render(template_name, context).map_err(PromptError::from)
    }

    /// Render a one-off string template, not registered under any name.
    pub fn render_string(&self, template: &str, context: &tera::Context) -> Result<String, PromptError> {
        Tera::one_off(template, context, false).map_err(PromptError::from)
    }
}

impl Default for TeraEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tera::Context;

    #[test]
    fn new_creates_empty_engine() {
        let engine = TeraEngine::new();
        let ctx = Context::new();
        assert!(engine.render("nonexistent", &ctx).is_err());
    }

    #[test]
    fn add_template_and_render() {
        let mut engine = TeraEngine::new();
        engine.add_template("greeting", "Hello, {{ name }}!").unwrap();

        let mut ctx = Context::new();
        ctx.insert("name", "World");
        let result = engine.render("greeting", &ctx).unwrap();
        assert_eq!(result, "Hello, World!");
    }

    #[test]
    fn render_missing_variable_fails() {
        let mut engine = TeraEngine::new();
        engine.add_template("greeting", "Hello, {{ name }}!").unwrap();

        let ctx = Context::new();
        assert!(engine.render("greeting", &ctx).is_err());
    }

    #[test]
    fn render_string_one_off() {
        let engine = TeraEngine::new();
        let mut ctx = Context::new();
        ctx.insert("item", "Rust");
        let result = engine.render_string("I love {{ item }}.", &ctx).unwrap();
        assert_eq!(result, "I love Rust.");
    }

    #[test]
    fn add_template_replaces_existing() {
        let mut engine = TeraEngine::new();
        engine.add_template("t", "version 1").unwrap();
        engine.add_template("t", "version 2").unwrap();

        let ctx = Context::new();
        let result = engine.render("t", &ctx).unwrap();
        assert_eq!(result, "version 2");
    }

    #[test]
    fn render_with_conditional() {
        let mut engine = TeraEngine::new();
        engine
            .add_template("cond", "{% if show_greeting %}Hello!{% endif %}")
            .unwrap();

        let mut ctx = Context::new();
        ctx.insert("show_greeting", &true);
        assert_eq!(engine.render("cond", &ctx).unwrap(), "Hello!");

        let mut ctx2 = Context::new();
        ctx2.insert("show_greeting", &false);
        assert_eq!(engine.render("cond", &ctx2).unwrap(), "");
    }

    #[test]
    fn render_with_loop() {
        let mut engine = TeraEngine::new();
        engine
            .add_template("list", "{% for item in items %}- {{ item }}\n{% endfor %}")
            .unwrap();

        let mut ctx = Context::new();
        ctx.insert("items", &vec!["alpha", "beta"]);
        let result = engine.render("list", &ctx).unwrap();
        assert_eq!(result, "- alpha\n- beta\n");
    }
}
