//! Feed item -> notification rendering.
//!
//! [`render`] is a pure function: one arm per [`Payload`] variant, with
//! [`Payload::Unrecognized`] producing no message. Push events that need their
//! commit range backfilled get it from the caller (the dispatcher fetches it
//! beforehand), so rendering never touches the network.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::sources::feed_item::{
    CommitSummary, CreatePayload, FeedItem, ForkPayload, IssueCommentPayload, IssuesPayload,
    Payload, PullRequestPayload, PushPayload, ReleasePayload,
};
use crate::sources::EventKind;
use crate::utils::text::{capitalize, first_line, short_sha, truncate};

/// Commits listed individually in a push description.
pub const MAX_LISTED_COMMITS: usize = 5;
pub const COMMIT_MESSAGE_LIMIT: usize = 50;
pub const RELEASE_BODY_LIMIT: usize = 200;
pub const ISSUE_TITLE_LIMIT: usize = 100;
pub const COMMENT_BODY_LIMIT: usize = 150;
pub const PR_TITLE_LIMIT: usize = 100;

/// Color for kinds without a palette entry.
pub const DEFAULT_COLOR: u32 = 0x95A5A6;

pub fn color_for(kind: Option<EventKind>) -> u32 {
    match kind {
        Some(EventKind::Push) => 0x2ECC71,
        Some(EventKind::Create) => 0x3498DB,
        Some(EventKind::Fork) => 0x9B59B6,
        Some(EventKind::Watch) => 0xF1C40F,
        Some(EventKind::Release) => 0xE67E22,
        Some(EventKind::Issues) => 0xE74C3C,
        Some(EventKind::IssueComment) => 0x1ABC9C,
        Some(EventKind::PullRequest) => 0x6E5494,
        None => DEFAULT_COLOR,
    }
}

/// A destination-agnostic rich message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedMessage {
    pub color: u32,
    pub author_name: String,
    pub author_icon_url: Option<String>,
    pub author_url: String,
    pub title: String,
    pub url: Option<String>,
    pub description: Option<String>,
    pub footer_text: String,
    pub timestamp: DateTime<Utc>,
}

/// Kind-specific part of a message.
struct Body {
    title: String,
    url: Option<String>,
    description: Option<String>,
}

/// Render `item`, or `None` when its kind is not one the relay renders.
///
/// `backfill` holds commits fetched for a push event whose inline list was
/// empty; it is ignored for every other kind.
pub fn render(item: &FeedItem, backfill: &[CommitSummary]) -> Option<RenderedMessage> {
    let repo = &item.subject;
    let body = match &item.payload {
        Payload::Push(p) => push(p, backfill, &repo.repo_name, &repo.repo_url),
        Payload::Create(p) => create(p, &repo.repo_name, &repo.repo_url),
        Payload::Fork(p) => fork(p),
        Payload::Watch => Body {
            title: format!("Starred {}", repo.repo_name),
            url: Some(repo.repo_url.clone()),
            description: None,
        },
        Payload::Release(p) => release(p),
        Payload::Issues(p) => issue(p),
        Payload::IssueComment(p) => issue_comment(p),
        Payload::PullRequest(p) => pull_request(p),
        Payload::Unrecognized => return None,
    };

    Some(RenderedMessage {
        color: color_for(item.event_kind()),
        author_name: item.actor.name.clone(),
        author_icon_url: item.actor.avatar_url.clone(),
        author_url: item.actor.profile_url(),
        title: body.title,
        url: body.url,
        description: body.description.filter(|d| !d.is_empty()),
        footer_text: item.kind.clone(),
        timestamp: item.timestamp,
    })
}

fn push(p: &PushPayload, backfill: &[CommitSummary], repo: &str, repo_url: &str) -> Body {
    let branch = p.branch();
    let commits = if p.commits.is_empty() { backfill } else { &p.commits[..] };

    let count = p
        .size
        .filter(|&n| n > 0)
        .or_else(|| (!commits.is_empty()).then_some(commits.len() as u64))
        .unwrap_or(1);
    let noun = if count == 1 { "commit" } else { "commits" };

    let description = if commits.is_empty() {
        p.head
            .as_deref()
            .filter(|h| !h.is_empty())
            .map(|head| format!("[`{}`]({repo_url}/commit/{head})", short_sha(head)))
    } else {
        let mut lines: Vec<String> = commits
            .iter()
            .take(MAX_LISTED_COMMITS)
            .map(|c| {
                format!(
                    "[`{}`]({repo_url}/commit/{}) {}",
                    short_sha(&c.sha),
                    c.sha,
                    truncate(Some(first_line(&c.message)), COMMIT_MESSAGE_LIMIT)
                )
            })
            .collect();
        if commits.len() > MAX_LISTED_COMMITS {
            lines.push(format!("+{} more", commits.len() - MAX_LISTED_COMMITS));
        }
        Some(lines.join("\n"))
    };

    let url = match (p.compare_range(), p.head.as_deref()) {
        (Some((before, head)), _) => format!("{repo_url}/compare/{before}...{head}"),
        (None, Some(head)) if !head.is_empty() => format!("{repo_url}/commit/{head}"),
        _ => format!("{repo_url}/tree/{branch}"),
    };

    Body {
        title: format!("Pushed {count} {noun} to {repo}/{branch}"),
        url: Some(url),
        description,
    }
}

fn create(p: &CreatePayload, repo: &str, repo_url: &str) -> Body {
    let git_ref = p.git_ref.as_deref().filter(|r| !r.is_empty());
    let target = git_ref.unwrap_or(repo);
    let url = match git_ref {
        Some(r) => format!("{repo_url}/tree/{r}"),
        None => repo_url.to_string(),
    };
    Body {
        title: format!("Created {} {target}", p.ref_type),
        url: Some(url),
        description: p.description.clone(),
    }
}

fn fork(p: &ForkPayload) -> Body {
    Body {
        title: format!("Forked to {}", p.forkee.full_name),
        url: p.forkee.html_url.clone(),
        description: p.forkee.description.clone(),
    }
}

fn release(p: &ReleasePayload) -> Body {
    let r = &p.release;
    let mut title = format!("Released {}", r.tag_name);
    if let Some(name) = r.name.as_deref().filter(|n| !n.is_empty() && *n != r.tag_name) {
        title.push_str(": ");
        title.push_str(name);
    }
    Body {
        title,
        url: r.html_url.clone(),
        description: Some(truncate(r.body.as_deref(), RELEASE_BODY_LIMIT)),
    }
}

fn issue(p: &IssuesPayload) -> Body {
    Body {
        title: format!("{} issue #{}", capitalize(&p.action), p.issue.number),
        url: p.issue.html_url.clone(),
        description: Some(truncate(p.issue.title.as_deref(), ISSUE_TITLE_LIMIT)),
    }
}

fn issue_comment(p: &IssueCommentPayload) -> Body {
    Body {
        title: format!("Commented on #{}", p.issue.number),
        url: p.comment.html_url.clone().or_else(|| p.issue.html_url.clone()),
        description: Some(truncate(p.comment.body.as_deref(), COMMENT_BODY_LIMIT)),
    }
}

fn pull_request(p: &PullRequestPayload) -> Body {
    let mut title = format!("{} PR #{}", capitalize(&p.action), p.number());
    if p.pull_request.merged == Some(true) {
        title.push_str(" (merged)");
    }
    Body {
        title,
        url: p.pull_request.html_url.clone(),
        description: Some(truncate(p.pull_request.title.as_deref(), PR_TITLE_LIMIT)),
    }
}
