//! BigQuery REST (v2) implementation of [`WarehouseClient`].

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::schema::ColumnSchema;
use crate::sink::credentials::TokenProvider;
use crate::sink::warehouse::{
    JobHandle, JobStats, LoadOptions, TableInfo, TableRef, WarehouseClient, WarehouseError,
    WarehouseResult,
};

pub const DEFAULT_API_BASE: &str = "https://bigquery.googleapis.com";

#[derive(Clone)]
pub struct BigQueryClient {
    http: Client,
    api_root: String,
    tokens: Arc<dyn TokenProvider>,
    location: Option<String>,
    poll_interval: Duration,
}

impl BigQueryClient {
    pub fn new(
        api_base: Option<&str>,
        tokens: Arc<dyn TokenProvider>,
        location: Option<String>,
        timeout: Duration,
        poll_interval: Duration,
    ) -> WarehouseResult<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(BigQueryClient {
            http,
            api_root: api_base
                .unwrap_or(DEFAULT_API_BASE)
                .trim_end_matches('/')
                .to_string(),
            tokens,
            location,
            poll_interval,
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/bigquery/v2{}", self.api_root, path)
    }

    fn upload_url(&self, path: &str) -> String {
        format!("{}/upload/bigquery/v2{}", self.api_root, path)
    }

    fn authorized(&self, request: RequestBuilder) -> WarehouseResult<RequestBuilder> {
        Ok(request.bearer_auth(self.tokens.access_token()?))
    }

    fn send(&self, request: RequestBuilder) -> WarehouseResult<Response> {
        let resp = self.authorized(request)?.send()?;
        check_status(resp)
    }

    fn send_json<T: for<'de> Deserialize<'de>>(&self, request: RequestBuilder) -> WarehouseResult<T> {
        Ok(self.send(request)?.json::<T>()?)
    }

    fn location_query(&self, location: Option<&str>) -> Vec<(&'static str, String)> {
        location
            .or(self.location.as_deref())
            .map(|l| vec![("location", l.to_string())])
            .unwrap_or_default()
    }
}

/// Turns an error response into the matching [`WarehouseError`].
fn check_status(resp: Response) -> WarehouseResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().unwrap_or_default();
    Err(status_error(status, &body))
}

pub(crate) fn status_error(status: StatusCode, body: &str) -> WarehouseError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string());
    match status {
        StatusCode::NOT_FOUND => WarehouseError::NotFound(message),
        StatusCode::CONFLICT => WarehouseError::AlreadyExists(message),
        StatusCode::UNAUTHORIZED => WarehouseError::Auth(message),
        _ => WarehouseError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

pub(crate) fn schema_fields(schema: &ColumnSchema) -> Value {
    Value::Array(
        schema
            .columns()
            .iter()
            .map(|c| {
                json!({
                    "name": c.name,
                    "type": c.column_type.warehouse_type(),
                    "mode": c.mode.warehouse_mode(),
                    "description": c.description,
                })
            })
            .collect(),
    )
}

pub(crate) fn load_job_body(table: &TableRef, schema: &ColumnSchema, options: &LoadOptions) -> Value {
    json!({
        "configuration": {
            "load": {
                "destinationTable": {
                    "projectId": table.project,
                    "datasetId": table.dataset,
                    "tableId": table.table,
                },
                "schema": { "fields": schema_fields(schema) },
                "sourceFormat": "CSV",
                "skipLeadingRows": options.skip_leading_rows,
                "maxBadRecords": options.max_bad_records,
                "allowQuotedNewlines": options.allow_quoted_newlines,
                "writeDisposition": options.write_disposition.as_api_str(),
                "createDisposition": "CREATE_IF_NEEDED",
                "encoding": "UTF-8",
            }
        }
    })
}

// BigQuery encodes int64 values as JSON strings.
fn parse_u64(value: &Value) -> u64 {
    match value {
        Value::String(s) => s.parse().unwrap_or(0),
        Value::Number(n) => n.as_u64().unwrap_or(0),
        _ => 0,
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    project_id: String,
    job_id: String,
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobResource {
    job_reference: JobReference,
    #[serde(default)]
    status: Value,
    #[serde(default)]
    statistics: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    job_reference: Option<JobReference>,
    #[serde(default)]
    rows: Vec<Value>,
    page_token: Option<String>,
}

pub(crate) fn parse_rows(rows: &[Value]) -> Vec<Vec<Option<String>>> {
    rows.iter()
        .map(|row| {
            row["f"]
                .as_array()
                .map(|cells| {
                    cells
                        .iter()
                        .map(|cell| match &cell["v"] {
                            Value::Null => None,
                            Value::String(s) => Some(s.clone()),
                            other => Some(other.to_string()),
                        })
                        .collect()
                })
                .unwrap_or_default()
        })
        .collect()
}

/// Reads the terminal state of a job resource. `None` while the job is still running.
fn job_outcome(job: &JobResource) -> Option<WarehouseResult<JobStats>> {
    if job.status["state"].as_str() != Some("DONE") {
        return None;
    }
    if let Some(err) = job.status.get("errorResult").filter(|e| !e.is_null()) {
        let mut message = err["message"].as_str().unwrap_or("unknown error").to_string();
        if let Some(details) = job.status["errors"].as_array() {
            for detail in details.iter().filter_map(|d| d["message"].as_str()) {
                if detail != message {
                    message.push_str("; ");
                    message.push_str(detail);
                }
            }
        }
        return Some(Err(WarehouseError::JobFailed {
            job_id: job.job_reference.job_id.clone(),
            message,
        }));
    }
    Some(Ok(JobStats {
        output_rows: parse_u64(&job.statistics["load"]["outputRows"]),
    }))
}

impl WarehouseClient for BigQueryClient {
    fn get_dataset(&self, project: &str, dataset: &str) -> WarehouseResult<()> {
        let url = self.api_url(&format!("/projects/{}/datasets/{}", project, dataset));
        self.send(self.http.get(url))?;
        Ok(())
    }

    fn create_dataset(&self, project: &str, dataset: &str) -> WarehouseResult<()> {
        let url = self.api_url(&format!("/projects/{}/datasets", project));
        let mut body = json!({
            "datasetReference": { "projectId": project, "datasetId": dataset }
        });
        if let Some(location) = &self.location {
            body["location"] = json!(location);
        }
        self.send(self.http.post(url).json(&body))?;
        Ok(())
    }

    fn get_table(&self, table: &TableRef) -> WarehouseResult<TableInfo> {
        let url = self.api_url(&format!(
            "/projects/{}/datasets/{}/tables/{}",
            table.project, table.dataset, table.table
        ));
        let resource: Value = self.send_json(self.http.get(url))?;
        Ok(TableInfo {
            num_rows: parse_u64(&resource["numRows"]),
            num_columns: resource["schema"]["fields"]
                .as_array()
                .map(|f| f.len())
                .unwrap_or(0),
        })
    }

    fn create_table(&self, table: &TableRef, schema: &ColumnSchema) -> WarehouseResult<()> {
        let url = self.api_url(&format!(
            "/projects/{}/datasets/{}/tables",
            table.project, table.dataset
        ));
        let body = json!({
            "tableReference": {
                "projectId": table.project,
                "datasetId": table.dataset,
                "tableId": table.table,
            },
            "schema": { "fields": schema_fields(schema) },
        });
        self.send(self.http.post(url).json(&body))?;
        Ok(())
    }

    fn submit_load(
        &self,
        table: &TableRef,
        schema: &ColumnSchema,
        staging_file: &Path,
        options: &LoadOptions,
    ) -> WarehouseResult<JobHandle> {
        let data = fs::read(staging_file).map_err(|e| WarehouseError::Api {
            status: 0,
            message: format!("cannot read staging file '{}': {}", staging_file.display(), e),
        })?;

        let mut job = load_job_body(table, schema, options);
        if let Some(location) = &self.location {
            job["jobReference"] = json!({ "projectId": table.project, "location": location });
        }

        // Resumable upload: the first request carries the job, the second the CSV bytes.
        let init_url = self.upload_url(&format!("/projects/{}/jobs", table.project));
        let init = self.send(
            self.http
                .post(init_url)
                .query(&[("uploadType", "resumable")])
                .json(&job),
        )?;
        let session_url = init
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| WarehouseError::Api {
                status: init.status().as_u16(),
                message: "resumable upload response has no Location header".to_string(),
            })?;

        debug!(bytes = data.len(), "Uploading staging file for {}", table);
        let resource: JobResource = self.send_json(
            self.http
                .put(session_url)
                .header(CONTENT_TYPE, "application/octet-stream")
                .body(data),
        )?;

        Ok(JobHandle {
            project: resource.job_reference.project_id,
            job_id: resource.job_reference.job_id,
            location: resource.job_reference.location,
        })
    }

    fn wait_for_job(&self, job: &JobHandle) -> WarehouseResult<JobStats> {
        let url = self.api_url(&format!("/projects/{}/jobs/{}", job.project, job.job_id));
        loop {
            let request = self
                .http
                .get(&url)
                .query(&self.location_query(job.location.as_deref()));
            let resource: JobResource = self.send_json(request)?;
            if let Some(outcome) = job_outcome(&resource) {
                return outcome;
            }
            debug!(job_id = %job.job_id, "Load job still running");
            thread::sleep(self.poll_interval);
        }
    }

    fn query_rows(&self, project: &str, sql: &str) -> WarehouseResult<Vec<Vec<Option<String>>>> {
        let url = self.api_url(&format!("/projects/{}/queries", project));
        let mut body = json!({ "query": sql, "useLegacySql": false, "timeoutMs": 10000 });
        if let Some(location) = &self.location {
            body["location"] = json!(location);
        }
        let mut response: QueryResponse = self.send_json(self.http.post(url).json(&body))?;
        let mut rows = parse_rows(&response.rows);

        while !response.job_complete || response.page_token.is_some() {
            let reference = response.job_reference.as_ref().ok_or_else(|| WarehouseError::Api {
                status: 0,
                message: "query response has no job reference".to_string(),
            })?;
            if !response.job_complete {
                warn!(job_id = %reference.job_id, "Query not complete yet, polling");
                thread::sleep(self.poll_interval);
            }
            let results_url = self.api_url(&format!(
                "/projects/{}/queries/{}",
                reference.project_id, reference.job_id
            ));
            let mut params = self.location_query(reference.location.as_deref());
            params.push(("timeoutMs", "10000".to_string()));
            if let Some(token) = &response.page_token {
                params.push(("pageToken", token.clone()));
            }
            let next: QueryResponse = self.send_json(self.http.get(results_url).query(&params))?;
            rows.extend(parse_rows(&next.rows));
            response = QueryResponse {
                job_reference: next.job_reference.or(response.job_reference),
                ..next
            };
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_model::AnnotationKind;
    use crate::schema::schema_for;

    #[test]
    fn test_status_mapping() {
        let body = r#"{"error": {"code": 404, "message": "Not found: Dataset p:d"}}"#;
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, body),
            WarehouseError::NotFound(m) if m == "Not found: Dataset p:d"
        ));
        assert!(matches!(
            status_error(StatusCode::CONFLICT, "duplicate"),
            WarehouseError::AlreadyExists(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_REQUEST, "bad"),
            WarehouseError::Api { status: 400, .. }
        ));
    }

    #[test]
    fn test_load_job_body() {
        let table = TableRef::new("p", "d", "t_spacy_depparse");
        let body = load_job_body(
            &table,
            schema_for(AnnotationKind::DependencyParse),
            &LoadOptions::default(),
        );
        let load = &body["configuration"]["load"];
        assert_eq!(load["sourceFormat"], "CSV");
        assert_eq!(load["skipLeadingRows"], 1);
        assert_eq!(load["maxBadRecords"], 0);
        assert_eq!(load["allowQuotedNewlines"], true);
        assert_eq!(load["writeDisposition"], "WRITE_APPEND");
        assert_eq!(load["destinationTable"]["tableId"], "t_spacy_depparse");

        let fields = load["schema"]["fields"].as_array().unwrap();
        assert_eq!(fields.len(), 15);
        assert_eq!(fields[0]["name"], "identifier");
        assert_eq!(fields[0]["mode"], "REQUIRED");
        assert_eq!(fields[9]["name"], "head_num");
        assert_eq!(fields[9]["type"], "INTEGER");
    }

    #[test]
    fn test_parse_rows() {
        let rows: Vec<Value> = serde_json::from_str(
            r#"[{"f": [{"v": "1"}, {"v": "hello"}]}, {"f": [{"v": "2"}, {"v": null}]}]"#,
        )
        .unwrap();
        assert_eq!(
            parse_rows(&rows),
            vec![
                vec![Some("1".to_string()), Some("hello".to_string())],
                vec![Some("2".to_string()), None],
            ]
        );
    }

    #[test]
    fn test_job_outcome() {
        let running: JobResource = serde_json::from_value(json!({
            "jobReference": {"projectId": "p", "jobId": "j1"},
            "status": {"state": "RUNNING"}
        }))
        .unwrap();
        assert!(job_outcome(&running).is_none());

        let done: JobResource = serde_json::from_value(json!({
            "jobReference": {"projectId": "p", "jobId": "j1"},
            "status": {"state": "DONE"},
            "statistics": {"load": {"outputRows": "42"}}
        }))
        .unwrap();
        assert_eq!(job_outcome(&done).unwrap().unwrap().output_rows, 42);

        let failed: JobResource = serde_json::from_value(json!({
            "jobReference": {"projectId": "p", "jobId": "j2"},
            "status": {
                "state": "DONE",
                "errorResult": {"reason": "invalid", "message": "Error while reading data"},
                "errors": [{"message": "Error while reading data"}, {"message": "row 3: too many values"}]
            }
        }))
        .unwrap();
        match job_outcome(&failed) {
            Some(Err(WarehouseError::JobFailed { job_id, message })) => {
                assert_eq!(job_id, "j2");
                assert_eq!(message, "Error while reading data; row 3: too many values");
            }
            other => panic!("Expected JobFailed, got {:?}", other),
        }
    }
}
