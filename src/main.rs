use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

mod config;
mod cookies;
mod drive;
mod fetcher;
mod orchestrator;
mod poller;
mod scraper;
mod types;
mod util;

use crate::config::Config;
use crate::drive::login::{QrLogin, ScanStatus};
use crate::drive::{Api115, CloudDrive, DirRef, DriveError, Session};
use crate::orchestrator::{DownloadRequest, Pipeline};
use crate::poller::PollOutcome;
use crate::scraper::{Catalog, MagnetLookup};
use crate::types::{MagnetRecord, Task};

#[derive(Parser, Debug)]
#[command(name = "jav115", version, about = "JavDB 搜索 + 115 网盘云下载", long_about = None)]
struct Cli {
    /// 输出调试日志
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 在 javdb 搜索影片
    Search {
        keyword: String,
        /// 结果数量
        #[arg(short = 'n', long, default_value_t = scraper::DEFAULT_SEARCH_LIMIT)]
        limit: usize,
        /// JSON 输出
        #[arg(short, long)]
        json: bool,
    },

    /// 获取指定番号的磁力链接
    Magnet {
        code: String,
        /// JSON 输出
        #[arg(short, long)]
        json: bool,
        /// 只输出第一个磁力链接（方便管道使用）
        #[arg(short = '1', long)]
        first: bool,
    },

    /// 搜索并添加到 115 云下载
    Download {
        keyword: String,
        /// 115 保存目录 ID，/ 为根目录
        #[arg(short, long, default_value = "/")]
        save_path: String,
        /// 下载完成后移动到的目录 ID
        #[arg(short, long)]
        move_to: Option<String>,
        /// 等待下载完成
        #[arg(short, long)]
        wait: bool,
        /// 等待超时（秒）
        #[arg(short, long, default_value_t = poller::DEFAULT_WAIT_TIMEOUT.as_secs())]
        timeout: u64,
    },

    /// 查看 115 云下载任务
    Tasks {
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },

    /// 列出 115 目录
    Ls {
        #[arg(default_value = "/")]
        path: String,
        #[arg(short = 'n', long, default_value_t = 30)]
        limit: usize,
    },

    /// 115 网盘操作
    #[command(subcommand)]
    Drive(DriveCommand),
}

#[derive(Subcommand, Debug)]
enum DriveCommand {
    /// 登录 115（扫码或直接传入 cookie）
    Login {
        /// 直接传入 cookie 字符串
        #[arg(short, long)]
        cookie: Option<String>,
    },

    #[command(flatten)]
    Account(AccountCommand),
}

/// 需要已登录会话的网盘命令
#[derive(Subcommand, Debug)]
enum AccountCommand {
    /// 显示当前登录用户
    Whoami,

    /// 添加磁力链接到云下载
    Add {
        magnet: String,
        #[arg(short, long, default_value = "/")]
        save_path: String,
    },

    /// 查看云下载任务列表
    Tasks {
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },

    /// 列出目录内容
    Ls {
        #[arg(default_value = "/")]
        path: String,
        #[arg(short = 'n', long, default_value_t = 30)]
        limit: usize,
    },

    /// 移动文件到指定目录
    Mv { file_id: String, target_dir_id: String },

    /// 搜索网盘文件
    Search {
        keyword: String,
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },

    /// 查询云下载任务状态
    Status {
        info_hash: String,
        /// 等待下载完成
        #[arg(short, long)]
        wait: bool,
        /// 等待超时（秒）
        #[arg(short, long, default_value_t = poller::DEFAULT_WAIT_TIMEOUT.as_secs())]
        timeout: u64,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    util::set_debug(cli.debug);

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            if let Some(DriveError::NotLoggedIn) = e.downcast_ref::<DriveError>() {
                eprintln!("{}", "未登录！请先运行: jav115 drive login".red().bold());
            } else {
                eprintln!("{} {:#}", "错误:".red().bold(), e);
            }
            1
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    let config = Config::from_env()?;
    config.ensure_dir()?;
    util::debug(format!("config dir: {}", config.config_dir.display()));

    match cli.command {
        Commands::Search { keyword, limit, json } => {
            if !json {
                println!("{} {}", "搜索:".cyan(), keyword);
            }
            let catalog = Catalog::from_config(&config)?;
            let results = catalog.search(&keyword, limit).await.context("搜索失败")?;
            if json {
                util::print_json(&results);
            } else if results.is_empty() {
                println!("{}", "未找到结果".yellow());
            } else {
                util::print_search_table(&results);
                println!("\n使用 {} 获取磁力链接", "jav115 magnet <番号>".cyan());
            }
            Ok(0)
        }
        Commands::Magnet { code, json, first } => {
            let quiet = json || first;
            if !quiet {
                println!("{} {}", "获取磁力链接:".cyan(), code);
            }
            let catalog = Catalog::from_config(&config)?;
            let lookup = catalog.lookup_magnets(&code).await.context("获取磁力链接失败")?;
            let magnets = match lookup {
                MagnetLookup::CodeNotFound => {
                    if !quiet {
                        println!("{}", "未找到该番号".yellow());
                    } else if json {
                        util::print_json(&Vec::<MagnetRecord>::new());
                    }
                    return Ok(0);
                }
                MagnetLookup::Found { detail_url, magnets } => {
                    if !quiet {
                        println!("{}", format!("详情页: {}", detail_url).dimmed());
                    }
                    magnets
                }
            };
            if first {
                if let Some(m) = magnets.first() {
                    println!("{}", m.magnet);
                }
            } else if json {
                util::print_json(&magnets);
            } else if magnets.is_empty() {
                println!("{}", "未找到磁力链接（可能需要登录）".yellow());
            } else {
                util::print_magnet_table(&code, &magnets);
            }
            Ok(0)
        }
        Commands::Download { keyword, save_path, move_to, wait, timeout } => {
            // login is checked before touching the network
            let drive = open_drive(&config)?;
            let catalog = Catalog::from_config(&config)?;
            let req = DownloadRequest {
                keyword,
                save_path,
                move_to,
                wait,
                timeout: Duration::from_secs(timeout),
                poll_interval: config.poll_interval,
            };
            let spinner = progress_spinner();
            let stdin = std::io::stdin();
            let mut input = stdin.lock();
            let outcome = Pipeline::new(&catalog, &drive)
                .run(&req, &mut input, |task| show_progress(&spinner, task))
                .await;
            spinner.finish_and_clear();
            orchestrator::print_outcome(&outcome);
            Ok(outcome.exit_code())
        }
        Commands::Tasks { limit } => {
            let drive = open_drive(&config)?;
            list_tasks(&drive, limit).await
        }
        Commands::Ls { path, limit } => {
            let drive = open_drive(&config)?;
            list_dir(&drive, &path, limit).await
        }
        Commands::Drive(cmd) => run_drive(cmd, &config).await,
    }
}

async fn run_drive(cmd: DriveCommand, config: &Config) -> Result<i32> {
    match cmd {
        DriveCommand::Login { cookie } => login(config, cookie).await,
        DriveCommand::Account(cmd) => run_account(cmd, &open_drive(config)?, config).await,
    }
}

async fn run_account(cmd: AccountCommand, drive: &Api115, config: &Config) -> Result<i32> {
    match cmd {
        AccountCommand::Whoami => {
            let info = drive.user_info().await.context("获取用户信息失败")?;
            println!("用户名: {}", info.user_name);
            println!("用户ID: {}", info.user_id);
            Ok(0)
        }
        AccountCommand::Add { magnet, save_path } => {
            println!("{}", "添加云下载任务...".cyan());
            println!("链接: {}", util::truncate(&magnet, 60));
            let added = drive
                .add_offline_download(&magnet, &save_path)
                .await
                .context("添加云下载失败")?;
            if added.ok {
                println!("{}", "✓ 任务添加成功！".green());
                println!("Info Hash: {}", added.info_hash.as_deref().unwrap_or("N/A"));
                Ok(0)
            } else {
                println!(
                    "{} {}",
                    "✗ 添加失败:".red(),
                    added.error.as_deref().unwrap_or("未知错误")
                );
                Ok(1)
            }
        }
        AccountCommand::Tasks { limit } => list_tasks(drive, limit).await,
        AccountCommand::Ls { path, limit } => list_dir(drive, &path, limit).await,
        AccountCommand::Mv { file_id, target_dir_id } => {
            let fid: u64 = file_id.trim().parse().with_context(|| format!("文件ID无效: {}", file_id))?;
            let target: u64 = target_dir_id
                .trim()
                .parse()
                .with_context(|| format!("目录ID无效: {}", target_dir_id))?;
            if drive.move_files(&[fid], target).await.context("移动失败")? {
                println!("{} {}", "✓ 文件已移动到目录".green(), target);
                Ok(0)
            } else {
                println!("{}", "移动失败".red());
                Ok(1)
            }
        }
        AccountCommand::Search { keyword, limit } => {
            let files = drive.search_files(&keyword, limit).await.context("搜索失败")?;
            if files.is_empty() {
                println!("{}", format!("未找到 '{}' 相关文件", keyword).yellow());
            } else {
                util::print_entries_table(&format!("搜索结果: {}", keyword), &files);
            }
            Ok(0)
        }
        AccountCommand::Status { info_hash, wait, timeout } => {
            if !wait {
                let tasks = drive.list_offline_tasks().await.context("获取任务列表失败")?;
                return match poller::find_task(tasks, &info_hash) {
                    Some(task) => {
                        util::print_json(&task);
                        Ok(0)
                    }
                    None => {
                        println!("{}", "任务不存在".yellow());
                        Ok(0)
                    }
                };
            }
            let spinner = progress_spinner();
            let outcome = poller::wait_for_completion(
                drive,
                &info_hash,
                Duration::from_secs(timeout),
                config.poll_interval,
                |task| show_progress(&spinner, task),
            )
            .await;
            spinner.finish_and_clear();
            Ok(print_poll_outcome(&outcome.context("查询任务状态失败")?))
        }
    }
}

async fn login(config: &Config, cookie: Option<String>) -> Result<i32> {
    let session = match cookie {
        Some(c) => Session::new(c)?,
        None => match qr_login(config).await {
            Ok(s) => s,
            Err(e) => {
                println!("{} {}", "登录失败:".red(), e);
                println!("\n{}", "备选方案：从浏览器复制cookie后运行：".yellow());
                println!("jav115 drive login --cookie 'YOUR_COOKIE_STRING'");
                return Ok(1);
            }
        },
    };
    session.save(&config.session_path)?;
    println!("{}", "Cookie已保存！".green());

    let verified = match Api115::new(&session, config.request_timeout) {
        Ok(drive) => drive.user_info().await,
        Err(e) => Err(e),
    };
    match verified {
        Ok(info) => println!("{}", format!("欢迎, {}！", info.user_name).green()),
        Err(e) => println!("{} {}", "Cookie已保存，但验证失败:".yellow(), e),
    }
    Ok(0)
}

async fn qr_login(config: &Config) -> Result<Session, DriveError> {
    println!("正在生成登录二维码...");
    let qr = QrLogin::new(config.request_timeout)?;
    let token = qr.token().await?;
    println!("请用 115 App 扫描二维码: {}", token.image_url().cyan());
    let spinner = progress_spinner();
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner.set_message("等待扫码...");
    let session = qr
        .wait_confirmed(&token, Duration::from_secs(300), |status| {
            if status == ScanStatus::Scanned {
                spinner.set_message("已扫码，请在手机上确认登录...");
            }
        })
        .await;
    spinner.finish_and_clear();
    session
}

fn open_drive(config: &Config) -> Result<Api115> {
    let session = Session::load(&config.session_path)?;
    Ok(Api115::new(&session, config.request_timeout)?)
}

async fn list_tasks<D: CloudDrive + ?Sized>(drive: &D, limit: usize) -> Result<i32> {
    let tasks = drive.list_offline_tasks().await.context("获取任务列表失败")?;
    if tasks.is_empty() {
        println!("{}", "没有云下载任务".yellow());
    } else {
        let shown: Vec<Task> = tasks.into_iter().take(limit).collect();
        util::print_tasks_table(&shown);
    }
    Ok(0)
}

async fn list_dir<D: CloudDrive + ?Sized>(drive: &D, path: &str, limit: usize) -> Result<i32> {
    let dir = DirRef::parse(path);
    if dir == DirRef::Unresolved {
        println!(
            "{}",
            "提示：路径导航暂只支持目录ID，根目录请用 / 或 0，以下为根目录内容".yellow()
        );
    }
    let files = drive.list_files(dir.id(), limit).await.context("获取目录失败")?;
    if files.is_empty() {
        println!("{}", "目录为空".yellow());
    } else {
        util::print_entries_table(&format!("目录内容 (cid={})", dir.id()), &files);
    }
    Ok(0)
}

fn progress_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner
}

fn show_progress(spinner: &ProgressBar, task: &Task) {
    spinner.set_message(format!("{}... {:.1}%", task.state().label(), task.percent_done));
    spinner.tick();
}

fn print_poll_outcome(outcome: &PollOutcome) -> i32 {
    match outcome {
        PollOutcome::Complete(task) => {
            println!("{} {}", "✓ 下载完成:".green(), task.name);
            println!("文件ID: {}", task.file_id.as_deref().unwrap_or("N/A"));
            0
        }
        PollOutcome::Failed(task) => {
            println!("{} {}", "✗ 下载失败:".red(), task.name);
            1
        }
        PollOutcome::NotFound => {
            println!("{}", "任务不存在".yellow());
            1
        }
        PollOutcome::TimedOut => {
            println!("{}", "等待超时".yellow());
            1
        }
    }
}
