//! `appforge config` — Configuration management commands.

use appforge_config::AppConfig;

pub fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let mut warnings = Vec::new();
            if !config.has_api_key() {
                warnings.push("No API key set (set APPFORGE_API_KEY or ANTHROPIC_API_KEY)");
            }
            if config.thinking_budget == 0 {
                warnings.push("Extended thinking is disabled (thinking_budget = 0)");
            }
            if config.agent.completion_marker.is_empty() {
                warnings.push("No completion marker; runs end only on a tool-free turn");
            }

            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            println!();
            println!("   Model:       {}", config.model);
            println!("   Iterations:  {}", config.agent.max_iterations);
            println!(
                "   Context:     warn at {} tokens, limit {}",
                config.cache.warn_tokens, config.cache.max_tokens
            );
            println!(
                "   Cache TTLs:  {}s / {}s / {}s",
                config.cache.stable_ttl_secs, config.cache.semi_stable_ttl_secs, config.cache.active_ttl_secs
            );
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub fn show() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if config.api_key.is_some() {
        config.api_key = Some("[REDACTED]".into());
    }
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

pub fn path() {
    println!("{}", config_path().display());
}

pub fn init() {
    print!("{}", AppConfig::default_toml());
}

fn config_path() -> std::path::PathBuf {
    AppConfig::config_dir().join("config.toml")
}
