//! NOVA 演示入口
//!
//! 初始化日志、加载配置、构建三层编排器，依次处理三条示例消息并打印各层输出；
//! 正常结束或收到 Ctrl+C 后显式关闭所有层。

use anyhow::Context;
use nova::config::{load_config, AppConfig};
use nova::core::{LayerOutcome, Nova, NovaBuilder, RoundResults};
use nova::layer::Message;

const DEMO_MESSAGES: [&str; 3] = [
    "I'm feeling quite anxious about my presentation tomorrow.",
    "I've been preparing for weeks but still don't feel ready.",
    "Maybe I should practice one more time?",
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    nova::observability::init();

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let mut nova = NovaBuilder::new(cfg)
        .build()
        .context("Failed to build NOVA layers")?;

    println!("\n{}", "=".repeat(80));
    println!("NOVA Cognitive Architecture Demo");
    println!("{}", "=".repeat(80));
    println!("1. REACTIVE   - Fast, instinctive responses (<=10 words, immediate actions)");
    println!("2. RESPONSIVE - Context-aware, thoughtful responses (considers recent history)");
    println!("3. REFLECTIVE - Deep analysis, pattern recognition (learns from experience)");
    println!("{}", "=".repeat(80));

    let outcome = tokio::select! {
        r = run_demo(&mut nova) => r,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down");
            Ok(())
        }
    };

    // 无论演示是否成功都要释放总线资源
    nova.close().await.context("Failed to close NOVA layers")?;
    outcome
}

async fn run_demo(nova: &mut Nova) -> anyhow::Result<()> {
    for (i, content) in DEMO_MESSAGES.iter().enumerate() {
        println!("\nMessage {}: {}", i + 1, content);
        println!("{}", "-".repeat(80));

        let results = nova
            .process_message(&Message::user_input(*content))
            .await
            .context("Round failed")?;
        print_results(&results);

        println!("\n{}", "=".repeat(80));
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    }
    Ok(())
}

fn print_results(results: &RoundResults) {
    for (name, outcome) in results {
        println!("\n[{}]", name.to_uppercase());
        match outcome {
            LayerOutcome::Completed(timed) => {
                let response = &timed.value;
                if let Some(context) = &response.context {
                    println!("Context considered: {}", context.join(" -> "));
                }
                if let Some(patterns) = response.patterns.as_ref().filter(|p| !p.is_empty()) {
                    println!("Identified patterns:");
                    for pattern in patterns {
                        println!("  - {}", pattern);
                    }
                }
                println!(
                    "-> {} ({:.0} ms)",
                    response.content,
                    timed.timing.processing_duration * 1000.0
                );
            }
            LayerOutcome::Failed(failure) => {
                println!("!! {}: {}", failure.kind, failure.content);
            }
        }
    }
}
