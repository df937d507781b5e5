//! Blocking client for the GitLab REST API (v4).
//!
//! Listing calls follow the `x-next-page` header until it is empty.
//! Issues and notes are addressed by project ID and issue IID, so the client
//! keeps an ID to IID cache filled from every issue it sees.

use super::{NewIssue, NewMilestone, StateEvent, Tracker, TrackerError, TrackerResult};
use crate::config::Endpoint;
use crate::model::{Issue, Milestone, Note, Project, State, User};
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, trace};

const PER_PAGE: &str = "100";
const TOKEN_HEADER: &str = "PRIVATE-TOKEN";
const NEXT_PAGE_HEADER: &str = "x-next-page";
const MAX_ERROR_BODY: usize = 300;

#[derive(Debug, Deserialize)]
struct WireMilestoneRef {
    iid: u64,
}

#[derive(Debug, Deserialize)]
struct WireMilestone {
    id: u64,
    iid: u64,
    title: String,
    #[serde(default)]
    description: Option<String>,
    state: String,
    #[serde(default)]
    due_date: Option<String>,
    #[serde(default)]
    start_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireIssue {
    id: u64,
    iid: u64,
    title: String,
    #[serde(default)]
    description: Option<String>,
    state: String,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    milestone: Option<WireMilestoneRef>,
}

#[derive(Debug, Deserialize)]
struct WireNote {
    id: u64,
    body: String,
    #[serde(default)]
    author: Option<User>,
    #[serde(default)]
    system: bool,
}

fn parse_state(url: &str, state: &str) -> TrackerResult<State> {
    state.parse().map_err(|reason| TrackerError::Decode {
        url: url.to_string(),
        reason,
    })
}

impl WireMilestone {
    fn into_model(self, url: &str) -> TrackerResult<Milestone> {
        Ok(Milestone {
            iid: self.iid,
            id: self.id,
            title: self.title,
            description: self.description.filter(|d| !d.is_empty()),
            state: parse_state(url, &self.state)?,
            due_date: self.due_date,
            start_date: self.start_date,
        })
    }
}

impl WireIssue {
    fn into_model(self, url: &str) -> TrackerResult<Issue> {
        Ok(Issue {
            iid: self.iid,
            id: self.id,
            title: self.title,
            description: self.description.filter(|d| !d.is_empty()),
            labels: self.labels.into_iter().collect(),
            state: parse_state(url, &self.state)?,
            milestone_iid: self.milestone.map(|m| m.iid),
        })
    }
}

impl From<WireNote> for Note {
    fn from(note: WireNote) -> Self {
        Self {
            id: note.id,
            body: note.body,
            author: note.author,
            system: note.system,
        }
    }
}

/// [`Tracker`] backed by a GitLab instance.
pub struct GitLabClient {
    host: String,
    api: String,
    token: String,
    http: Client,
    issue_iids: RefCell<HashMap<(u64, u64), u64>>,
}

impl fmt::Debug for GitLabClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitLabClient")
            .field("host", &self.host)
            .field("token", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl GitLabClient {
    /// Build a client for one side. No request is sent until the first call.
    pub fn connect(endpoint: &Endpoint, timeout: Duration) -> TrackerResult<Self> {
        let host = endpoint.host.trim_end_matches('/').to_string();
        let http = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(endpoint.insecure_tls)
            .user_agent(concat!("glt/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| TrackerError::Unreachable {
                url: host.clone(),
                reason: err.to_string(),
            })?;
        Ok(Self {
            api: format!("{host}/api/v4"),
            host,
            token: endpoint.token.clone(),
            http,
            issue_iids: RefCell::new(HashMap::new()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api)
    }

    fn send(&self, request: RequestBuilder, url: &str) -> TrackerResult<Response> {
        let response = request
            .header(TOKEN_HEADER, &self.token)
            .send()
            .map_err(|err| TrackerError::Unreachable {
                url: url.to_string(),
                reason: err.to_string(),
            })?;
        let status = response.status();
        trace!(url, status = status.as_u16(), "tracker response");
        if status.is_success() {
            return Ok(response);
        }
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => TrackerError::Unauthorized {
                url: url.to_string(),
            },
            StatusCode::NOT_FOUND => TrackerError::NotFound {
                url: url.to_string(),
            },
            _ => {
                let mut message = response.text().unwrap_or_default();
                if message.len() > MAX_ERROR_BODY {
                    let mut cut = MAX_ERROR_BODY;
                    while !message.is_char_boundary(cut) {
                        cut -= 1;
                    }
                    message.truncate(cut);
                }
                TrackerError::Api {
                    url: url.to_string(),
                    status: status.as_u16(),
                    message,
                }
            }
        })
    }

    fn decode<T: DeserializeOwned>(response: Response, url: &str) -> TrackerResult<T> {
        response.json().map_err(|err| TrackerError::Decode {
            url: url.to_string(),
            reason: err.to_string(),
        })
    }

    /// GET every page of a listing.
    fn get_all<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> TrackerResult<Vec<T>> {
        let url = self.url(path);
        let mut items = Vec::new();
        let mut page = String::from("1");
        loop {
            let request = self
                .http
                .get(&url)
                .query(query)
                .query(&[("per_page", PER_PAGE), ("page", page.as_str())]);
            let response = self.send(request, &url)?;
            let next = response
                .headers()
                .get(NEXT_PAGE_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .unwrap_or_default()
                .to_string();
            let mut batch: Vec<T> = Self::decode(response, &url)?;
            debug!(url = %url, page = %page, count = batch.len(), "fetched page");
            items.append(&mut batch);
            if next.is_empty() {
                break;
            }
            page = next;
        }
        Ok(items)
    }

    fn post<T: DeserializeOwned>(&self, path: &str, body: &Value) -> TrackerResult<T> {
        let url = self.url(path);
        let response = self.send(self.http.post(&url).json(body), &url)?;
        Self::decode(response, &url)
    }

    fn put<T: DeserializeOwned>(&self, path: &str, body: &Value) -> TrackerResult<T> {
        let url = self.url(path);
        let response = self.send(self.http.put(&url).json(body), &url)?;
        Self::decode(response, &url)
    }

    fn remember(&self, project_id: u64, issue: &Issue) {
        self.issue_iids
            .borrow_mut()
            .insert((project_id, issue.id), issue.iid);
    }

    fn issue_url(&self, project_id: u64, iid: u64) -> String {
        format!("/projects/{project_id}/issues/{iid}")
    }
}

impl Tracker for GitLabClient {
    fn host(&self) -> &str {
        &self.host
    }

    fn list_users(&self) -> TrackerResult<Vec<User>> {
        self.get_all("/users", &[])
    }

    fn list_projects(&self) -> TrackerResult<Vec<Project>> {
        self.get_all("/projects", &[("membership", "true"), ("simple", "false")])
    }

    fn list_milestones(&self, project_id: u64) -> TrackerResult<Vec<Milestone>> {
        let path = format!("/projects/{project_id}/milestones");
        let url = self.url(&path);
        self.get_all::<WireMilestone>(&path, &[])?
            .into_iter()
            .map(|m| m.into_model(&url))
            .collect()
    }

    fn create_milestone(
        &mut self,
        project_id: u64,
        milestone: &NewMilestone,
    ) -> TrackerResult<Milestone> {
        let path = format!("/projects/{project_id}/milestones");
        let body = json!({
            "title": milestone.title,
            "description": milestone.description,
            "due_date": milestone.due_date,
            "start_date": milestone.start_date,
        });
        let created: WireMilestone = self.post(&path, &body)?;
        created.into_model(&self.url(&path))
    }

    fn list_issues(&self, project_id: u64) -> TrackerResult<Vec<Issue>> {
        let path = format!("/projects/{project_id}/issues");
        let url = self.url(&path);
        let issues = self
            .get_all::<WireIssue>(&path, &[("scope", "all"), ("state", "all")])?
            .into_iter()
            .map(|i| i.into_model(&url))
            .collect::<TrackerResult<Vec<_>>>()?;
        for issue in &issues {
            self.remember(project_id, issue);
        }
        Ok(issues)
    }

    fn get_issue(&self, project_id: u64, id: u64) -> TrackerResult<Issue> {
        let cached = self.issue_iids.borrow().get(&(project_id, id)).copied();
        let iid = match cached {
            Some(iid) => iid,
            None => self
                .list_issues(project_id)?
                .into_iter()
                .find(|i| i.id == id)
                .map(|i| i.iid)
                .ok_or_else(|| TrackerError::NotFound {
                    url: self.url(&format!("/projects/{project_id}/issues?id={id}")),
                })?,
        };
        let path = self.issue_url(project_id, iid);
        let url = self.url(&path);
        let response = self.send(self.http.get(&url), &url)?;
        let wire: WireIssue = Self::decode(response, &url)?;
        wire.into_model(&url)
    }

    fn create_issue(&mut self, project_id: u64, issue: &NewIssue) -> TrackerResult<Issue> {
        let path = format!("/projects/{project_id}/issues");
        let body = json!({
            "title": issue.title,
            "description": issue.description,
            "labels": issue.labels,
            "milestone_id": issue.milestone_id,
            "assignee_ids": [issue.assignee_id],
        });
        let created: WireIssue = self.post(&path, &body)?;
        let created = created.into_model(&self.url(&path))?;
        self.remember(project_id, &created);
        Ok(created)
    }

    fn edit_issue(
        &mut self,
        project_id: u64,
        issue: &Issue,
        event: StateEvent,
    ) -> TrackerResult<Issue> {
        let Some(state_event) = event.as_param() else {
            return Ok(issue.clone());
        };
        let path = self.issue_url(project_id, issue.iid);
        let edited: WireIssue = self.put(&path, &json!({ "state_event": state_event }))?;
        edited.into_model(&self.url(&path))
    }

    fn list_notes(&self, project_id: u64, issue: &Issue) -> TrackerResult<Vec<Note>> {
        let path = format!("{}/notes", self.issue_url(project_id, issue.iid));
        Ok(self
            .get_all::<WireNote>(&path, &[("sort", "asc"), ("order_by", "created_at")])?
            .into_iter()
            .map(Note::from)
            .collect())
    }

    fn create_note(&mut self, project_id: u64, issue: &Issue, body: &str) -> TrackerResult<Note> {
        let path = format!("{}/notes", self.issue_url(project_id, issue.iid));
        let created: WireNote = self.post(&path, &json!({ "body": body }))?;
        Ok(created.into())
    }
}
