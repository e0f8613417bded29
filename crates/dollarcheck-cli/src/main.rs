use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dollarcheck_core::{
    next_steps, AgentStatus, CheckerOptions, DoctorReport, NoopTelemetry, OptionsError, ScanResult, Scanner,
    Telemetry, TracingTelemetry,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};

const RULE: &str = "======================================================================";

/// 配置错误的退出码（1 保留给“未提供文本”）
const EXIT_CONFIG: u8 = 2;

/// 命令行入口（基于 clap）
///
/// 不带子命令时等同于 `check`：`dollar-checker 'Price: $50'`。
#[derive(Parser, Debug)]
#[command(
    name = "dollar-checker",
    version,
    about = "Dollar sign checker for APM exception replay",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    /// TOML 配置文件；同名环境变量优先
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    check: CheckArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args, Debug)]
struct CheckArgs {
    /// 额外输出 JSON 格式的扫描结果（须放在文本之前）
    #[arg(long)]
    json: bool,

    /// 待检查文本（多个参数以单个空格拼接）；第一个词之后的内容一律视为文本
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    text: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 检查文本是否含 `$`，命中时进程直接崩溃
    Check(CheckArgs),
    /// 检查遥测配置并探测本地 agent
    Doctor {
        /// agent 探测超时（毫秒）
        #[arg(long, default_value_t = 2000)]
        timeout_ms: u64,

        /// 以 JSON 输出自检结果
        #[arg(long)]
        json: bool,
    },
}

/// check 的非崩溃结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CheckOutcome {
    Clean,
    NoInput,
}

impl From<CheckOutcome> for ExitCode {
    fn from(o: CheckOutcome) -> Self {
        match o {
            CheckOutcome::Clean => ExitCode::SUCCESS,
            CheckOutcome::NoInput => ExitCode::FAILURE,
        }
    }
}

fn main() -> Result<ExitCode> {
    // 初始化日志（支持通过 RUST_LOG 控制等级，例如 info、debug）
    init_tracing();
    install_panic_hook();
    let cli = Cli::parse();

    // 启动时只读取一次配置，之后显式传递
    let opts = match CheckerOptions::load(cli.config.as_deref()) {
        Ok(o) => o,
        Err(e) => return Ok(config_error(e)),
    };
    info!(?opts, "options loaded");

    let args = match cli.command {
        Some(Commands::Doctor { timeout_ms, json }) => {
            // doctor 总会探测 agent，端口必须合法
            if let Err(e) = opts.validate_agent_port() {
                return Ok(config_error(e));
            }
            return run_doctor(&opts, Duration::from_millis(timeout_ms), json);
        }
        Some(Commands::Check(args)) => args,
        None => cli.check,
    };

    let telemetry = telemetry_for(&opts);
    let outcome = run_check(&opts, telemetry.as_ref(), &args.text, args.json)?;
    Ok(outcome.into())
}

fn config_error(e: OptionsError) -> ExitCode {
    let err = anyhow::Error::new(e).context("load options");
    error!("{err:#}");
    eprintln!("Error: {err:?}");
    ExitCode::from(EXIT_CONFIG)
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    // 日志写 stderr，stdout 留给报告输出
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(env_filter).with_writer(std::io::stderr).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// panic 先记一条 error 日志，再交给默认 hook 打印
fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        error!(panic = %info, "unhandled panic");
        default_hook(info);
    }));
}

fn telemetry_for(opts: &CheckerOptions) -> Box<dyn Telemetry> {
    if opts.trace_enabled {
        Box::new(TracingTelemetry::new(opts.service.clone()))
    } else {
        Box::new(NoopTelemetry)
    }
}

/// 多个参数以单个空格拼接；无参数时返回 None
fn join_args(args: &[String]) -> Option<String> {
    if args.is_empty() { None } else { Some(args.join(" ")) }
}

fn run_check(opts: &CheckerOptions, telemetry: &dyn Telemetry, args: &[String], json: bool) -> Result<CheckOutcome> {
    println!("{RULE}");
    println!("Dollar Sign Checker with Datadog APM Exception Replay");
    println!("{RULE}");
    println!();

    let Some(text) = join_args(args) else {
        print_usage();
        if opts.trace_enabled {
            telemetry.emit_counter("dollar_checker.no_input", &[]);
        }
        return Ok(CheckOutcome::NoInput);
    };

    let mut main_span = telemetry.start_span("main");
    if opts.trace_enabled {
        telemetry.emit_counter("dollar_checker.started", &[]);
        main_span.set_tag("app.version", env!("CARGO_PKG_VERSION").into());
        main_span.set_tag("app.environment", opts.environment().into());
    }

    let scanner = Scanner::new(opts.scanner_config(), telemetry);
    // main 存活期间开启，成为其子 span；扫描中的日志事件挂在它下面
    let mut span = telemetry.start_span("check_for_dollar");
    println!("🔍 Checking text: '{text}'");
    let result = scanner.scan(&text, Some(span.as_mut()));

    if json {
        println!("{}", serde_json::to_string(&result).context("serialize scan result")?);
    }

    if let ScanResult::Failure(f) = &result {
        println!("\n❌ DOLLAR SIGN DETECTED at position {}!", f.position);
        println!("   Character: '{}'", f.character);
        println!("   Position: {}", f.position);
        println!("   Context: ...{}...", f.context);
        println!("\n💥 Raising unhandled ForbiddenCharacterFound panic...\n");
    }
    // 命中即崩溃，不做恢复
    if let Err(e) = result.into_result(&text) {
        e.raise();
    }

    println!("✅ No dollar sign found - text is valid!\n");
    println!("{RULE}");
    println!("✅ SUCCESS - No dollar signs detected!");
    println!("{RULE}");
    println!();
    Ok(CheckOutcome::Clean)
}

fn print_usage() {
    println!("❌ Error: No text provided\n");
    println!("Usage: dollar-checker [--json] <text>...");
    println!("\nExamples:");
    println!("  dollar-checker 'Hello World'        # ✅ OK");
    println!("  dollar-checker 'Price: 50 dollars'  # ✅ OK");
    println!("  dollar-checker 'Price: $50'         # 💥 CRASH!");
    println!("  dollar-checker 'Cost is $100'       # 💥 CRASH!");
    println!();
}

fn run_doctor(opts: &CheckerOptions, timeout: Duration, json: bool) -> Result<ExitCode> {
    let report = DoctorReport::collect(opts, timeout);
    info!(agent = ?report.agent, "doctor finished");

    if json {
        println!("{}", serde_json::to_string_pretty(&report).context("serialize doctor report")?);
        return Ok(ExitCode::SUCCESS);
    }

    println!("{RULE}");
    println!("Datadog Exception Replay Configuration Check");
    println!("{RULE}");
    println!();

    let f = &report.features;
    println!("✓ {} version: {}", f.tool, f.version);
    println!("  ✓ Exception Replay: unhandled panics are raised on '$'");
    if f.trace_enabled {
        println!("  ✓ Tracing enabled (service: {}, env: {})", f.service, f.environment);
    } else {
        println!("  ⚠ Tracing disabled (DD_TRACE_ENABLED is not 'true')");
    }
    println!();

    println!("Environment Variables:");
    for row in &report.env {
        println!("  {}: {}", row.key, row.display);
    }
    println!();

    println!("Checking Datadog Agent connection...");
    let addr = &report.agent_address;
    match &report.agent {
        AgentStatus::Running => println!("  ✓ Datadog Agent is running at {addr}"),
        AgentStatus::UnexpectedStatus(code) => println!("  ⚠ Datadog Agent responded with status {code}"),
        AgentStatus::Unreachable(reason) => {
            println!("  ✗ Cannot connect to Datadog Agent at {addr}");
            println!("    ({reason})");
            println!("  → Make sure Datadog Agent is installed and running");
        }
        AgentStatus::TimedOut => println!("  ✗ Connection to Datadog Agent timed out"),
    }
    println!();

    println!("{RULE}");
    println!("Configuration Check Complete");
    println!("{RULE}");
    println!();
    println!("Next steps:");
    for (i, step) in next_steps().iter().enumerate() {
        println!("{}. {step}", i + 1);
    }
    println!();
    Ok(ExitCode::SUCCESS)
}
