//! gremlin-translate 命令行工具
//!
//! 读取 JSON 指令列表，输出 Groovy 脚本或在内存图上执行

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use gremlin_translation::cli::{PrintMode, Printer};
use gremlin_translation::engine::Plan;
use gremlin_translation::translation::Fragment;
use gremlin_translation::{
    Bytecode, Graph, GroovyBuilder, Program, TranslationBuilder, TranslatorConfig,
    TraversalBuilder,
};
use std::io::Read;
use std::path::PathBuf;
use std::process;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "gremlin-translate")]
#[command(version, about = "Gremlin 遍历程序的渲染与执行工具")]
struct Cli {
    /// 配置文件 (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 输出 Gremlin-Groovy 脚本
    Render {
        #[command(flatten)]
        input: Input,

        /// 覆盖顶层遍历源名称
        #[arg(long)]
        source: Option<String>,
    },
    /// 在空的内存图上执行并打印结果
    Run {
        #[command(flatten)]
        input: Input,

        /// 垂直显示结果
        #[arg(short = 'G', long)]
        vertical: bool,

        /// 覆盖 repeat 最大循环次数
        #[arg(long)]
        max_loops: Option<u32>,

        /// 同时打印执行统计
        #[arg(long)]
        stats: bool,
    },
    /// 打印指令列表和执行计划
    Explain {
        #[command(flatten)]
        input: Input,
    },
}

#[derive(Args, Debug)]
struct Input {
    /// 指令列表文件，`-` 表示标准输入
    #[arg(short, long, default_value = "-")]
    input: String,
}

impl Input {
    fn read(&self) -> anyhow::Result<Program> {
        let json = if self.input == "-" {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("读取标准输入失败")?;
            buf
        } else {
            std::fs::read_to_string(&self.input)
                .with_context(|| format!("读取文件失败: {}", self.input))?
        };
        let bytecode = Bytecode::from_json(&json).context("指令列表格式错误")?;
        debug!(instructions = bytecode.len(), "loaded bytecode");
        Ok(bytecode.to_program()?)
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(Cli::parse()) {
        eprintln!("{} {:#}", "错误:".red().bold(), err);
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => TranslatorConfig::from_file(path)
            .with_context(|| format!("加载配置失败: {}", path.display()))?,
        None => TranslatorConfig::default(),
    };

    match cli.command {
        Command::Render { input, source } => {
            if let Some(source) = source {
                config.script.traversal_source = source;
            }
            let program = input.read()?;
            let builder =
                GroovyBuilder::new(config.script).with_fragment(Fragment::from_program(program));
            println!("{}", builder.build()?);
        }

        Command::Run {
            input,
            vertical,
            max_loops,
            stats,
        } => {
            if let Some(max_loops) = max_loops {
                config.engine.max_loops = max_loops;
            }
            let program = input.read()?;
            let builder = TraversalBuilder::from_program(program, Graph::in_memory(), config.engine);
            let result = builder.build()?.execute()?;

            let mode = if vertical {
                PrintMode::Vertical
            } else {
                PrintMode::Table
            };
            let printer = Printer::new(mode);
            print!("{}", printer.print_result(&result.values, &result.stats));
            if stats {
                println!("{}", printer.print_stats(&result.stats));
            }
        }

        Command::Explain { input } => {
            let program = input.read()?;
            println!("{} {}", "bytecode:".green(), Bytecode::from_program(&program));
            println!("{} {}", "plan:".green(), Plan::compile(&program)?.explain());
        }
    }

    Ok(())
}
