//! search -> pick -> magnet -> offline download -> (wait) pipeline.

use colored::Colorize;
use std::io::BufRead;
use std::time::Duration;

use crate::drive::CloudDrive;
use crate::fetcher::Transport;
use crate::poller::{self, PollOutcome};
use crate::scraper::{self, Catalog, DEFAULT_SEARCH_LIMIT};
use crate::types::Task;
use crate::util;

#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub keyword: String,
    /// Target directory id on the drive; `/` is the root.
    pub save_path: String,
    pub move_to: Option<String>,
    pub wait: bool,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

/// Every way a download run can end.
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadOutcome {
    SearchFailed(String),
    NoResults,
    InvalidSelection(String),
    MagnetLookupFailed(String),
    NoMagnet { code: String },
    AddFailed(String),
    NoInfoHash { magnet: String },
    /// Added to offline download, not waited on.
    Submitted { info_hash: String },
    Completed(Task),
    /// Download finished but moving it to `move_to` is not implemented yet.
    MovePending { task: Task, move_to: String },
    DownloadFailed(Task),
    TaskNotFound { info_hash: String },
    TimedOut { info_hash: String },
    StatusFailed(String),
}

impl DownloadOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            DownloadOutcome::Submitted { .. } | DownloadOutcome::Completed(_) | DownloadOutcome::MovePending { .. }
        )
    }

    /// Nothing-found outcomes exit cleanly; failures exit non-zero.
    pub fn exit_code(&self) -> i32 {
        match self {
            _ if self.is_success() => 0,
            DownloadOutcome::NoResults | DownloadOutcome::NoMagnet { .. } => 0,
            _ => 1,
        }
    }
}

/// Turn a typed 1-based choice into a 0-based index. Blank input picks 1.
pub fn parse_choice(input: &str, count: usize) -> Result<usize, String> {
    let input = input.trim();
    let choice: usize = if input.is_empty() {
        1
    } else {
        input.parse().map_err(|_| format!("无效选择: {}", input))?
    };
    if choice < 1 || choice > count {
        return Err(format!("无效选择: {} (可选 1-{})", choice, count));
    }
    Ok(choice - 1)
}

pub struct Pipeline<'a, T, D: ?Sized> {
    catalog: &'a Catalog<T>,
    drive: &'a D,
}

impl<'a, T, D> Pipeline<'a, T, D>
where
    T: Transport,
    D: CloudDrive + ?Sized,
{
    pub fn new(catalog: &'a Catalog<T>, drive: &'a D) -> Self {
        Self { catalog, drive }
    }

    /// Run one download. `input` supplies the selection when the search
    /// returns more than one result.
    pub async fn run<R, F>(&self, req: &DownloadRequest, input: &mut R, on_progress: F) -> DownloadOutcome
    where
        R: BufRead,
        F: FnMut(&Task),
    {
        println!("{} {}", "搜索:".cyan(), req.keyword);
        let results = match self.catalog.search(&req.keyword, DEFAULT_SEARCH_LIMIT).await {
            Ok(r) => r,
            Err(e) => return DownloadOutcome::SearchFailed(format!("{:#}", e)),
        };
        if results.is_empty() {
            return DownloadOutcome::NoResults;
        }

        util::print_search_table(&results);
        let index = if results.len() == 1 {
            0
        } else {
            print!("选择 [1]: ");
            let _ = std::io::Write::flush(&mut std::io::stdout());
            let mut line = String::new();
            if let Err(e) = input.read_line(&mut line) {
                return DownloadOutcome::InvalidSelection(e.to_string());
            }
            match parse_choice(&line, results.len()) {
                Ok(i) => i,
                Err(msg) => return DownloadOutcome::InvalidSelection(msg),
            }
        };
        let selected = &results[index];
        println!("{} {}", "选择:".green(), selected.code);

        println!("{}", "获取磁力链接...".cyan());
        let magnets = match self.catalog.magnets_for_code(&selected.code).await {
            Ok(m) => m,
            Err(e) => return DownloadOutcome::MagnetLookupFailed(format!("{:#}", e)),
        };
        let Some(best) = magnets.into_iter().next() else {
            return DownloadOutcome::NoMagnet { code: selected.code.clone() };
        };
        println!("{}", util::truncate(&best.magnet, 60).dimmed());

        println!("{}", "添加到115云下载...".cyan());
        let added = match self.drive.add_offline_download(&best.magnet, &req.save_path).await {
            Ok(a) => a,
            Err(e) => return DownloadOutcome::AddFailed(e.to_string()),
        };
        if !added.ok {
            return DownloadOutcome::AddFailed(added.error.unwrap_or_else(|| "未知错误".to_string()));
        }

        let Some(info_hash) = scraper::extract_info_hash(&best.magnet) else {
            return DownloadOutcome::NoInfoHash { magnet: best.magnet };
        };
        println!("Info Hash: {}", info_hash);
        if !req.wait {
            return DownloadOutcome::Submitted { info_hash };
        }

        println!("{}", "等待下载完成...".cyan());
        let polled =
            poller::wait_for_completion(self.drive, &info_hash, req.timeout, req.poll_interval, on_progress).await;
        match polled {
            Err(e) => DownloadOutcome::StatusFailed(e.to_string()),
            Ok(PollOutcome::Complete(task)) => match &req.move_to {
                Some(dir) => DownloadOutcome::MovePending { task, move_to: dir.clone() },
                None => DownloadOutcome::Completed(task),
            },
            Ok(PollOutcome::Failed(task)) => DownloadOutcome::DownloadFailed(task),
            Ok(PollOutcome::NotFound) => DownloadOutcome::TaskNotFound { info_hash },
            Ok(PollOutcome::TimedOut) => DownloadOutcome::TimedOut { info_hash },
        }
    }
}

pub fn print_outcome(outcome: &DownloadOutcome) {
    match outcome {
        DownloadOutcome::SearchFailed(e) => println!("{} {}", "搜索失败:".red(), e),
        DownloadOutcome::NoResults => println!("{}", "未找到结果".yellow()),
        DownloadOutcome::InvalidSelection(e) => println!("{}", e.red()),
        DownloadOutcome::MagnetLookupFailed(e) => println!("{} {}", "获取磁力链接失败:".red(), e),
        DownloadOutcome::NoMagnet { code } => {
            println!("{} {}", "未找到磁力链接（可能需要登录）:".yellow(), code)
        }
        DownloadOutcome::AddFailed(e) => println!("{} {}", "添加云下载失败:".red(), e),
        DownloadOutcome::NoInfoHash { magnet } => println!("{} {}", "无法提取hash:".yellow(), magnet),
        DownloadOutcome::Submitted { info_hash } => {
            println!("使用 {} 查看进度", format!("jav115 drive status {}", info_hash).cyan())
        }
        DownloadOutcome::Completed(task) => print_completed(task),
        DownloadOutcome::MovePending { task, move_to } => {
            print_completed(task);
            println!("{} {}", "移动文件到目录".cyan(), move_to);
            println!("{}", "文件移动功能待完善（尚未实现）".yellow());
        }
        DownloadOutcome::DownloadFailed(task) => println!("{} {}", "下载失败:".red(), task.name),
        DownloadOutcome::TaskNotFound { info_hash } => println!("{} {}", "任务不存在:".yellow(), info_hash),
        DownloadOutcome::TimedOut { info_hash } => println!("{} {}", "等待超时:".yellow(), info_hash),
        DownloadOutcome::StatusFailed(e) => println!("{} {}", "查询任务状态失败:".red(), e),
    }
    if outcome.is_success() {
        println!("{}", "✓ 完成！".green().bold());
    }
}

fn print_completed(task: &Task) {
    println!("{} {}", "✓ 下载完成:".green(), task.name);
    println!("文件ID: {}", task.file_id.as_deref().unwrap_or("N/A"));
}
