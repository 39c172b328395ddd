use anyhow::Result;
use std::io::{self, Write};

use language_tutor::export::{export_csv, export_json, export_text};
use language_tutor::{
    AnalysisResult, ChatSession, Config, LanguageTutor, Level, APP_TITLE, LANGUAGES,
};

#[tokio::main]
async fn main() -> Result<()> {
    // 诊断日志走 stderr，聊天内容走 stdout
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let config = Config::load()?;
    let tutor = LanguageTutor::new(config.clone())?;

    let level = Level::parse(&config.chat.default_level).unwrap_or(Level::Intermediate);
    let mut session = ChatSession::new(&config.chat.default_language, level);

    println!("🌍 {}", APP_TITLE);
    println!(
        "   目标语言：{} {} · 水平：{}",
        session.language.flag,
        session.language.label,
        session.level.label()
    );
    if tutor.current_backend_name() == "mock" && config.api.provider != "mock" {
        println!("⚠️  未检测到 OPENAI_API_KEY / ANTHROPIC_API_KEY，使用本地 mock 后端");
        println!("   export OPENAI_API_KEY=... 或 export ANTHROPIC_API_KEY=... 可接入线上模型");
    }
    println!("   输入 /help 查看命令，直接输入文字开始对话");

    loop {
        print!("\n💬 > ");
        io::stdout().flush()?;

        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        let mut parts = input.splitn(2, ' ');
        let command = parts.next().unwrap_or("");
        let arg = parts.next().unwrap_or("").trim();

        match command {
            "/exit" | "/quit" => break,
            "/help" => print_help(),
            "/lang" => {
                if arg.is_empty() {
                    println!("可用语言：");
                    for lang in LANGUAGES {
                        println!("  {} {} ({})", lang.flag, lang.label, lang.code);
                    }
                } else if session.switch_language(arg) {
                    println!(
                        "🔁 已切换到 {} {}，历史已清空",
                        session.language.flag, session.language.label
                    );
                } else {
                    println!("❌ 不支持的语言代码：{}", arg);
                }
            }
            "/level" => match Level::parse(arg) {
                Some(level) => {
                    session.switch_level(level);
                    println!("🔁 水平已切换为 {}", level.label());
                }
                None => println!("❌ 水平应为 beginner/intermediate/advanced 或 初级/中级/高级"),
            },
            "/analysis" => {
                println!("🔍 分析中…");
                if tutor.analyze_last(&mut session).await {
                    if let Some(analysis) = &session.analysis {
                        print_analysis(analysis);
                    }
                } else {
                    println!("⚠️  还没有可分析的发言");
                }
            }
            "/translate" => match session.last_assistant_index() {
                Some(index) => {
                    if tutor.translate_turn(&mut session, index).await {
                        if let Some(translation) = &session.turns[index].translation {
                            println!("🌐 译文：{}", translation);
                        }
                    } else {
                        println!("❌ 翻译失败，请稍后再试");
                    }
                }
                None => println!("⚠️  还没有可翻译的回复"),
            },
            "/export" => {
                let result = match arg {
                    "txt" | "text" => export_text(&session, &config.output.transcript_text),
                    "csv" => export_csv(&session, &config.output.transcript_csv),
                    _ => export_json(&session, &config.output.transcript_json),
                };
                if let Err(e) = result {
                    println!("❌ 导出失败：{}", e);
                }
            }
            "/clear" => {
                session.clear();
                println!("🧹 历史已清空");
            }
            _ => {
                print!("🤖 ");
                io::stdout().flush()?;
                let mut sink = |delta: &str| {
                    print!("{}", delta);
                    let _ = io::stdout().flush();
                };

                if tutor.send_message(&mut session, input, &mut sink).await.is_some() {
                    println!();
                    if let Some(analysis) = &session.analysis {
                        print_analysis(analysis);
                    }
                }
            }
        }
    }

    println!("👋 再见！");
    Ok(())
}

fn print_help() {
    println!("命令：");
    println!("  /lang [代码]   查看或切换目标语言（切换会清空历史）");
    println!("  /level <水平>  切换学习者水平");
    println!("  /analysis      重新分析我的上一句发言");
    println!("  /translate     翻译最近一条回复");
    println!("  /export [json|txt|csv]  导出对话记录");
    println!("  /clear         清空当前对话");
    println!("  /exit          退出");
}

// 按原始应用侧边栏的顺序展示分析结果
fn print_analysis(analysis: &AnalysisResult) {
    println!("📊 本句分析");
    match &analysis.feedback {
        Some(feedback) => {
            println!("  1) 点评：{}", feedback.comment);
            if let Some(corrected) = &feedback.corrected {
                println!("     建议表达：{}", corrected);
            }
        }
        None => println!("  1) 点评：（无）"),
    }
    if !analysis.pinyin.is_empty() {
        println!("     注音：{}", analysis.pinyin);
    }
    println!("  2) 词汇：");
    if analysis.vocabulary.is_empty() {
        println!("     （无）");
    }
    for entry in analysis.vocabulary.iter().take(40) {
        if entry.phonetic.is_empty() {
            println!("     - {} — {}", entry.term, entry.meaning);
        } else {
            println!("     - {} ({}) — {}", entry.term, entry.phonetic, entry.meaning);
        }
    }
    println!(
        "  3) 语法：{}",
        if analysis.grammar.is_empty() { "（无）" } else { analysis.grammar.as_str() }
    );
    if !analysis.notes.is_empty() {
        println!("  4) 笔记：{}", analysis.notes);
    }
}
