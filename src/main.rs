use clap::Parser;
use lsm_logger::adapters::{SimulatedEnumerator, SimulatedOpener, SIMULATED_PORT};
use lsm_logger::app::console::ConsoleFormat;
use lsm_logger::core::port_resolver::PortResolver;
use lsm_logger::domain::ports::PortEnumerator;
use lsm_logger::utils::{logger, validation::Validate};
use lsm_logger::{
    run_session, AppConfig, CliConfig, CsvReadingSink, LsmError, SerialOpener,
    SerialPortEnumerator, SessionOptions, StopSignal,
};

#[tokio::main]
async fn main() {
    let cli = CliConfig::parse();

    // 初始化日誌
    if cli.log_json {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("🚀 Starting lsm-logger");

    let mut config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => exit_with(&e, 1),
    };

    // 應用命令列覆蓋設定
    cli.apply_overrides(&mut config);
    if cli.simulate && config.serial.port.is_none() {
        config.serial.port = Some(SIMULATED_PORT.to_string());
    }

    // 列出序列埠只需要埠號樣式，不必通過完整驗證
    if cli.list_ports {
        let code = if cli.simulate {
            list_ports(SimulatedEnumerator, &config)
        } else {
            list_ports(SerialPortEnumerator, &config)
        };
        std::process::exit(code);
    }

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        exit_with(&e, 1);
    }

    tracing::info!("✅ Configuration loaded and validated successfully");
    if !cli.events_json {
        display_config_summary(&config, cli.simulate);
    }

    // 開啟 CSV 紀錄檔 (失敗屬於啟動錯誤)
    let sink = match CsvReadingSink::open(&config.logging.csv_path, config.logging.timestamp_tz) {
        Ok(sink) => sink,
        Err(e) => exit_with(&LsmError::from(e), 1),
    };

    let options = SessionOptions {
        console: if cli.events_json {
            ConsoleFormat::Json
        } else {
            ConsoleFormat::Human
        },
        config_path: cli.config.clone(),
        ..SessionOptions::default()
    };
    let stop = StopSignal::new();

    let result = if cli.simulate {
        let opener = SimulatedOpener::new(config.simulator.clone());
        run_session(&config, SimulatedEnumerator, opener, sink, stop, options).await
    } else {
        run_session(&config, SerialPortEnumerator, SerialOpener, sink, stop, options).await
    };

    match result {
        Ok(summary) => {
            tracing::info!(
                "✅ Session finished: {} readings, {} logged, {} decode errors, {} connections",
                summary.readings,
                summary.persisted,
                summary.decode_errors,
                summary.connections
            );
            if summary.dropped_events > 0 {
                tracing::info!("{} status events were not displayed", summary.dropped_events);
            }
        }
        Err(e) => {
            tracing::error!("❌ Acquisition failed: {} (Category: {:?})", e, e.category());
            let code = e.exit_code();
            exit_with(&e, code);
        }
    }
}

fn exit_with(e: &LsmError, code: i32) -> ! {
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());
    std::process::exit(code);
}

fn list_ports<E: PortEnumerator>(enumerator: E, config: &AppConfig) -> i32 {
    let patterns = config.port_patterns();
    let resolver = match PortResolver::new(enumerator, &patterns) {
        Ok(resolver) => resolver,
        Err(e) => exit_with(&LsmError::from(e), 1),
    };

    let ports = match resolver.describe_ports() {
        Ok(ports) => ports,
        Err(e) => exit_with(&LsmError::from(e), 1),
    };
    let selected = resolver.resolve(config.serial.port.as_deref()).ok();

    if ports.is_empty() {
        println!("No serial ports found");
        return 0;
    }

    println!("Available serial ports:");
    for port in ports {
        let marker = if selected.as_deref() == Some(port.name.as_str()) {
            "*"
        } else {
            " "
        };
        println!(" {} {} - {}", marker, port.name, port.description);
    }
    if selected.is_some() {
        println!("(* = port that would be used)");
    }
    0
}

fn display_config_summary(config: &AppConfig, simulate: bool) {
    println!("📋 Configuration Summary:");
    match &config.serial.port {
        Some(port) => println!("  Port: {}", port),
        None => println!("  Port: auto-detect"),
    }
    if simulate {
        println!("  🔍 SIMULATED INSTRUMENT");
    }
    match config.line_settings() {
        Ok(line) => println!("  Line: {}", line),
        Err(e) => println!("  Line: {}", e),
    }
    println!("  Protocol: {:?}", config.protocol.kind);
    match config.build_rule_set() {
        Ok(rules) => {
            let labels: Vec<&str> = rules.rules().iter().map(|r| r.label.as_str()).collect();
            println!("  Rules: {} (precision {})", labels.join(", "), rules.precision());
        }
        Err(e) => println!("  Rules: {}", e),
    }
    println!("  Log: {}", config.logging.csv_path);
    println!();
}
