//! Subcommand implementations

use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use consent_core::{
    CategoryId, Classifier, ConsentConfig, ConsentManager, Page, RecordingPresenter,
    ScriptDescriptor,
};

use crate::report::RunReport;
use crate::Action;

pub struct RunOptions {
    pub url: String,
    pub html: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub headers: Vec<String>,
    pub writes: Vec<String>,
    pub scripts: Vec<String>,
    pub action: Action,
    pub selection: Vec<String>,
    pub late_headers: Vec<String>,
    pub linger_ms: u64,
    pub harden: bool,
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ConsentConfig> {
    let Some(path) = path else {
        return Ok(ConsentConfig::default());
    };

    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    ConsentConfig::from_json(&json).with_context(|| format!("invalid config {}", path.display()))
}

pub async fn run(options: RunOptions) -> anyhow::Result<RunReport> {
    let config = load_config(options.config.as_deref())?;

    let page = match &options.html {
        Some(path) => {
            let html = std::fs::read_to_string(path)
                .with_context(|| format!("reading page {}", path.display()))?;
            Page::from_html(&options.url, &html)?
        }
        None => Page::new(&options.url)?,
    };

    for header in &options.headers {
        page.receive_set_cookie_header(header);
    }

    if options.harden {
        page.harden_cookie_property();
        page.harden_node_insertion();
    }

    let presenter = Arc::new(RecordingPresenter::new());
    let manager = ConsentManager::init(Arc::clone(&page), config, presenter.clone())?;

    for assignment in &options.writes {
        page.set_cookie(assignment);
    }

    for src in &options.scripts {
        let script = page.create_element("script");
        page.set_attribute(script, "src", src)?;
        page.append_child(page.head(), script)?;
    }

    if !options.selection.is_empty() {
        manager.save_selection(options.selection.iter().map(CategoryId::new))?;
    } else {
        match options.action {
            Action::None => {}
            Action::AcceptAll => {
                manager.accept_all()?;
            }
            Action::RejectAll => {
                manager.reject_all()?;
            }
        }
    }

    for header in &options.late_headers {
        page.receive_set_cookie_header(header);
    }

    if options.linger_ms > 0 {
        tracing::debug!(linger_ms = options.linger_ms, "Waiting for periodic sweeps");
        tokio::time::sleep(Duration::from_millis(options.linger_ms)).await;
    }

    Ok(RunReport::collect(&manager, &presenter.events()))
}

pub fn classify(cookies: &[String], scripts: &[String]) {
    let classifier = Classifier::new();

    for name in cookies {
        let category = classifier.classify_cookie_name(name);
        println!(
            "cookie  {:<32} {}",
            name,
            category.as_ref().map_or("-", CategoryId::as_str)
        );
    }

    for src in scripts {
        let category = classifier.classify_script(&ScriptDescriptor::external(src.as_str()));
        println!(
            "script  {:<32} {}",
            src,
            category.as_ref().map_or("-", CategoryId::as_str)
        );
    }
}

pub fn check(path: &Path) -> anyhow::Result<()> {
    let config = load_config(Some(path))?;

    println!(
        "{}: ok (cookie {}, {} categories, sweep every {} ms)",
        path.display(),
        config.cookie_name,
        config.categories.len(),
        config.sweep_interval_ms
    );

    Ok(())
}
