use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use intake_core::config::StoreConfig;
use intake_core::domain::RecordId;

use crate::record::{fields, Record, RecordStore, SearchFilter, StoreError};

/// Client for the hosted record store API. One instance covers one base;
/// tables are addressed by name per call.
pub struct HttpRecordStore {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

impl HttpRecordStore {
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| StoreError::Request(err.to_string()))?;
        let base_url =
            format!("{}/{}", config.base_url.trim_end_matches('/'), config.base_id);

        Ok(Self { client, base_url, api_key: config.api_key.clone() })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.base_url, table)
    }

    async fn fetch_page(
        &self,
        table: &str,
        formula: Option<&str>,
        offset: Option<&str>,
    ) -> Result<ListResponse, StoreError> {
        let mut request = self
            .client
            .get(self.table_url(table))
            .bearer_auth(self.api_key.expose_secret());
        if let Some(formula) = formula {
            request = request.query(&[("filterByFormula", formula)]);
        }
        if let Some(offset) = offset {
            request = request.query(&[("offset", offset)]);
        }

        let response =
            request.send().await.map_err(|err| StoreError::Request(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Status {
                status: status.as_u16(),
                context: format!("list {table}"),
            });
        }

        response.json::<ListResponse>().await.map_err(|err| StoreError::Decode(err.to_string()))
    }
}

/// Renders a [`SearchFilter`] into the remote filter formula. `All` needs no
/// formula at all.
fn render_formula(filter: &SearchFilter) -> Option<String> {
    match filter {
        SearchFilter::All => None,
        SearchFilter::ProductQuery { name_contains, departments } => {
            let query = escape_formula_text(&name_contains.to_lowercase());
            let mut clauses = vec![
                format!("SEARCH('{query}', LOWER({{{}}}))", fields::NAME),
                format!("{{{}}} >= 1", fields::STOCK),
            ];

            if !departments.is_empty() {
                let options = departments
                    .iter()
                    .map(|department| {
                        format!(
                            "{{{}}} = '{}'",
                            fields::DEPARTMENT,
                            escape_formula_text(department)
                        )
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                clauses.push(format!("OR({options})"));
            }

            Some(format!("AND({})", clauses.join(", ")))
        }
    }
}

fn escape_formula_text(text: &str) -> String {
    text.replace('\\', "\\\\").replace('\'', "\\'")
}

#[async_trait]
impl RecordStore for HttpRecordStore {
    async fn search(&self, table: &str, filter: &SearchFilter) -> Result<Vec<Record>, StoreError> {
        let formula = render_formula(filter);
        debug!(table, formula = formula.as_deref().unwrap_or("<none>"), "store search");

        let mut records = Vec::new();
        let mut offset: Option<String> = None;

        // The API caps pages at 100 records and chains them with an offset.
        loop {
            let page = self.fetch_page(table, formula.as_deref(), offset.as_deref()).await?;
            records.extend(page.records.into_iter().map(WireRecord::into_record));
            match page.offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        Ok(records)
    }

    async fn get(&self, table: &str, id: &RecordId) -> Result<Option<Record>, StoreError> {
        let url = format!("{}/{}", self.table_url(table), id);
        let response = self
            .client
            .get(url)
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await
            .map_err(|err| StoreError::Request(err.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(StoreError::Status {
                status: status.as_u16(),
                context: format!("get {table}/{id}"),
            });
        }

        let wire =
            response.json::<WireRecord>().await.map_err(|err| StoreError::Decode(err.to_string()))?;
        Ok(Some(wire.into_record()))
    }

    async fn insert(&self, table: &str, fields: Map<String, Value>) -> Result<Record, StoreError> {
        debug!(table, "store insert");
        let body = InsertRequest { records: vec![InsertRecord { fields: &fields }] };
        let response = self
            .client
            .post(self.table_url(table))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|err| StoreError::Request(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Status {
                status: status.as_u16(),
                context: format!("insert {table}"),
            });
        }

        let mut parsed = response
            .json::<InsertResponse>()
            .await
            .map_err(|err| StoreError::Decode(err.to_string()))?;
        parsed
            .records
            .pop()
            .map(WireRecord::into_record)
            .ok_or_else(|| StoreError::Decode("insert response carried no record".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    records: Vec<WireRecord>,
    offset: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireRecord {
    id: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

impl WireRecord {
    fn into_record(self) -> Record {
        Record { id: RecordId(self.id), fields: self.fields }
    }
}

#[derive(Debug, Serialize)]
struct InsertRequest<'a> {
    records: Vec<InsertRecord<'a>>,
}

#[derive(Debug, Serialize)]
struct InsertRecord<'a> {
    fields: &'a Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct InsertResponse {
    records: Vec<WireRecord>,
}

#[cfg(test)]
mod tests {
    use super::render_formula;
    use crate::record::SearchFilter;

    #[test]
    fn all_filter_needs_no_formula() {
        assert_eq!(render_formula(&SearchFilter::All), None);
    }

    #[test]
    fn product_query_filters_name_stock_and_departments() {
        let filter = SearchFilter::ProductQuery {
            name_contains: "Mug".to_owned(),
            departments: vec!["Logistics".to_owned(), "Common".to_owned()],
        };

        assert_eq!(
            render_formula(&filter).as_deref(),
            Some(
                "AND(SEARCH('mug', LOWER({Name})), {Stock} >= 1, \
                 OR({Department} = 'Logistics', {Department} = 'Common'))"
            )
        );
    }

    #[test]
    fn empty_department_scope_drops_the_department_clause() {
        let filter =
            SearchFilter::ProductQuery { name_contains: "mug".to_owned(), departments: vec![] };

        assert_eq!(
            render_formula(&filter).as_deref(),
            Some("AND(SEARCH('mug', LOWER({Name})), {Stock} >= 1)")
        );
    }

    #[test]
    fn quotes_in_the_query_are_escaped() {
        let filter = SearchFilter::ProductQuery {
            name_contains: "d'artagnan".to_owned(),
            departments: vec![],
        };

        let formula = render_formula(&filter).unwrap_or_default();
        assert!(formula.contains("d\\'artagnan"));
    }
}
