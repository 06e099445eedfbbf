//! Run report rendering

use serde::Serialize;

use consent_core::{
    BlockedScript, ConsentManager, ConsentRecord, EnforcementMode, PresenterEvent,
};

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub host: String,
    pub mode: EnforcementMode,
    pub preferences: Option<ConsentRecord>,
    pub cookies: Vec<String>,
    pub executed_scripts: Vec<String>,
    pub blocked_scripts: Vec<BlockedScript>,
    pub blocked_cookie_writes: usize,
    pub presenter: Vec<PresenterEvent>,
    pub reloads: usize,
}

impl RunReport {
    pub fn collect(manager: &ConsentManager, presenter: &[PresenterEvent]) -> Self {
        let page = manager.page();

        let cookies = page
            .cookie()
            .split("; ")
            .filter(|pair| !pair.is_empty())
            .map(str::to_string)
            .collect();

        let executed_scripts = page
            .executed_scripts()
            .into_iter()
            .map(|script| match script.src {
                Some(src) => src,
                None => format!("inline: {}", script.text.trim()),
            })
            .collect();

        Self {
            host: page.hostname().to_string(),
            mode: manager.enforcement_mode(),
            preferences: manager.current_preferences(),
            cookies,
            executed_scripts,
            blocked_scripts: manager.blocked_scripts(),
            blocked_cookie_writes: manager.guard().blocked_count(),
            presenter: presenter.to_vec(),
            reloads: page.reload_count(),
        }
    }
}

pub fn print_run(report: &RunReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("host:        {}", report.host);
    println!("enforcement: {:?}", report.mode);
    match &report.preferences {
        Some(record) => {
            let categories: Vec<&str> = record.categories.iter().map(|c| c.as_str()).collect();
            println!("consent:     {}", categories.join(", "));
        }
        None => println!("consent:     (none)"),
    }

    println!("cookies:");
    for cookie in &report.cookies {
        println!("  {}", cookie);
    }

    println!("executed scripts:");
    for script in &report.executed_scripts {
        println!("  {}", script);
    }

    println!("blocked scripts:");
    for blocked in &report.blocked_scripts {
        println!("  [{}] {}", blocked.category, blocked.descriptor.label());
    }

    println!("blocked cookie writes: {}", report.blocked_cookie_writes);
    println!("reloads requested:     {}", report.reloads);

    Ok(())
}
