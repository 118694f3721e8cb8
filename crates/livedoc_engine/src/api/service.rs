/* 📖 # Why a single ApiService?

One `HttpService` handles every endpoint and routes internally on the path:

- `GET /api/projects` -> configured projects
- `GET /api/projects/{id}/events` -> live-sync event stream
- `GET /api/projects/{id}/tree?path=&recursive=` -> directory listing
- `GET /api/search?q=&project=&limit=` -> search results

There is one service to register with the PAL and one place where errors turn
into responses. MockPal tests drive it through `simulate_request` without a socket.
*/

use std::borrow::Cow;

use percent_encoding::percent_decode_str;
use serde::Serialize;
use tracing::{debug, info, warn};

use livedoc_base::pal::http::{
    HttpBody, HttpMethod, HttpRequest, HttpResponse, HttpService, HttpStatusCode,
};
use livedoc_base::{FilePath, LivedocError, LivedocResult, PalHandle};

use crate::config::{CatalogHandle, Project, ProjectId};
use crate::live_sync::LiveSyncHandle;
use crate::path_guard::{is_within, normalize_relative};
use crate::scanner::{has_excluded_segment, scan};
use crate::search::{SearchResult, search};

use super::sse::SseStream;

#[derive(Serialize)]
struct ProjectSummary<'a> {
    id: &'a str,
    name: &'a str,
}

/// A search hit tagged with the project it came from.
#[derive(Serialize)]
struct ProjectSearchResult<'a> {
    project: &'a str,
    #[serde(flatten)]
    result: &'a SearchResult,
}

#[derive(Serialize)]
struct TreeListing<'a> {
    project: &'a str,
    path: &'a str,
    entries: Vec<String>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

/// HTTP front of the live-sync hub and the search engine.
#[derive(Debug, Clone)]
pub struct ApiService {
    pal: PalHandle,
    catalog: CatalogHandle,
    live_sync: LiveSyncHandle,
    search_limit: usize,
}

impl ApiService {
    pub fn new(
        pal: PalHandle,
        catalog: CatalogHandle,
        live_sync: LiveSyncHandle,
        search_limit: usize,
    ) -> Self {
        Self {
            pal,
            catalog,
            live_sync,
            search_limit,
        }
    }

    fn route(&self, request: &HttpRequest) -> LivedocResult<HttpResponse> {
        let Some(rest) = request.path().strip_prefix("/api/") else {
            return Ok(error_response(HttpStatusCode::NotFound, "Not found"));
        };
        let segments: Vec<&str> = rest.trim_end_matches('/').split('/').collect();

        match segments.as_slice() {
            ["projects"] => self.handle_projects(),
            ["search"] => self.handle_search(request),
            ["projects", id, "events"] => match decode_segment(id) {
                Some(id) => Ok(self.handle_events(&ProjectId::new(id))),
                None => Ok(error_response(HttpStatusCode::BadRequest, "Invalid project id")),
            },
            ["projects", id, "tree"] => match decode_segment(id) {
                Some(id) => self.handle_tree(&ProjectId::new(id), request),
                None => Ok(error_response(HttpStatusCode::BadRequest, "Invalid project id")),
            },
            _ => Ok(error_response(HttpStatusCode::NotFound, "Not found")),
        }
    }

    fn handle_projects(&self) -> LivedocResult<HttpResponse> {
        let projects = self.catalog.projects();
        let summaries: Vec<ProjectSummary> = projects
            .iter()
            .map(|project| ProjectSummary {
                id: project.id.as_str(),
                name: &project.name,
            })
            .collect();
        json_response(&summaries)
    }

    fn handle_events(&self, project: &ProjectId) -> HttpResponse {
        let subscription = self.live_sync.subscribe(project);
        match &subscription {
            Some(subscription) => {
                info!(%project, connection = %subscription.id(), "Live-sync stream opened")
            }
            None => warn!(%project, "Live-sync stream requested for unknown project"),
        }
        HttpResponse::ok()
            .with_content_type("text/event-stream")
            .with_header("Cache-Control", "no-cache")
            .with_body(HttpBody::from_reader(SseStream::new(subscription)))
    }

    fn handle_search(&self, request: &HttpRequest) -> LivedocResult<HttpResponse> {
        let query = request.query_param("q").unwrap_or_default();
        let limit = match request.query_param("limit") {
            Some(limit) => match limit.parse::<usize>() {
                Ok(limit) => limit,
                Err(_) => {
                    return Ok(error_response(HttpStatusCode::BadRequest, "Invalid limit"));
                }
            },
            None => self.search_limit,
        };

        let projects: Vec<Project> = match request.query_param("project") {
            Some(id) => match self.catalog.find_project(&ProjectId::new(id)) {
                Some(project) => vec![project],
                None => {
                    return Ok(error_response(HttpStatusCode::NotFound, "Unknown project"));
                }
            },
            None => self.catalog.projects(),
        };

        let mut hits: Vec<(&ProjectId, SearchResult)> = Vec::new();
        for project in &projects {
            let remaining = limit.saturating_sub(hits.len());
            if remaining == 0 {
                break;
            }
            for result in search(&*self.pal, &project.root, &query, remaining) {
                hits.push((&project.id, result));
            }
        }
        debug!(query = %query, results = hits.len(), "Search finished");

        let body: Vec<ProjectSearchResult> = hits
            .iter()
            .map(|(project, result)| ProjectSearchResult {
                project: project.as_str(),
                result,
            })
            .collect();
        json_response(&body)
    }

    fn handle_tree(&self, id: &ProjectId, request: &HttpRequest) -> LivedocResult<HttpResponse> {
        let Some(project) = self.catalog.find_project(id) else {
            return Ok(error_response(HttpStatusCode::NotFound, "Unknown project"));
        };
        let path = request.query_param("path").unwrap_or_default();
        if !is_within(&project.root, &path) {
            warn!(project = %id, path = %path, "Rejected path outside project root");
            return Ok(error_response(HttpStatusCode::Forbidden, "Path outside project"));
        }
        let Some(relative) = normalize_relative(&path) else {
            return Ok(error_response(HttpStatusCode::BadRequest, "Path must be relative"));
        };
        if has_excluded_segment(relative.as_str()) {
            debug!(project = %id, path = %relative, "Tree request for excluded directory");
            return Ok(error_response(HttpStatusCode::NotFound, "Not found"));
        }
        let recursive = matches!(
            request.query_param("recursive").as_deref(),
            Some("true" | "1")
        );

        let directory = relative.to_path(&project.root);
        let prefix = FilePath::from(relative.clone());
        let mut entries: Vec<String> = scan(&*self.pal, &directory, &prefix, recursive)
            .iter()
            .map(|entry| entry.to_string())
            .collect();
        entries.sort();

        json_response(&TreeListing {
            project: id.as_str(),
            path: relative.as_str(),
            entries,
        })
    }
}

impl HttpService for ApiService {
    fn handle_request(&self, request: HttpRequest) -> LivedocResult<HttpResponse> {
        debug!(method = %request.method(), path = request.path(), "API request");
        if *request.method() != HttpMethod::Get {
            return Ok(error_response(
                HttpStatusCode::MethodNotAllowed,
                "Method not allowed",
            ));
        }
        self.route(&request)
    }
}

fn decode_segment(segment: &str) -> Option<String> {
    percent_decode_str(segment)
        .decode_utf8()
        .ok()
        .map(Cow::into_owned)
}

fn json_response<T: Serialize>(value: &T) -> LivedocResult<HttpResponse> {
    let body = serde_json::to_string(value).map_err(|error| {
        Box::new(LivedocError::message(format!(
            "Failed to serialize response: {error}"
        )))
    })?;
    Ok(HttpResponse::json(body))
}

fn error_response(status: HttpStatusCode, message: &str) -> HttpResponse {
    let body = serde_json::to_string(&ErrorBody { error: message })
        .unwrap_or_else(|_| String::from("{}"));
    HttpResponse::json(body).with_status(status)
}
