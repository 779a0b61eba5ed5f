use std::sync::Arc;

use tracing::instrument;

use crate::{
    dao::{Store, UnitOfWork},
    model::{
        apperror::{ApplicationError, ErrorType},
        charts::{self, ChartKind, ChartOutput, ChartPoint, ChartView, Dataset, DirectDefinition, Formatter, SeriesSpec},
        derived::ProjectionContext,
        models::{Row, SortDirection},
        schema::EntityDef,
        views::prettify,
    },
    service::{
        aggregate::{self, GroupRow, Series, Source},
        resolver::RowResolver,
    },
};

/**
 * Service producing chart datasets from the rows of an entity.
 */
pub struct ChartService {
    store: Arc<Store>,
    context: ProjectionContext,
}

impl ChartService {
    /**
     * Creates a new instance of `ChartService`.
     *
     * # Arguments
     * `store`: The store to read rows from.
     * `context`: Settings for derived projections.
     *
     * # Returns
     * A new instance of `ChartService`.
     */
    pub fn new(store: Arc<Store>, context: ProjectionContext) -> Self {
        ChartService { store, context }
    }

    /**
     * Computes the datasets of a chart.
     *
     * # Arguments
     * `name`: Name of the chart.
     * `group_by`: Optional group column picked by the caller among the chart's group-by columns.
     *
     * # Returns
     * The chart datasets, or `NotFound` for an unknown chart and `Validation` for a group column the chart does not offer.
     */
    #[instrument(skip(self))]
    pub async fn get_chart(&self, name: &str, group_by: Option<&str>) -> Result<ChartOutput, ApplicationError> {
        let chart = charts::chart(name)?;
        if let Some(column) = group_by
            && !chart.group_by_columns.contains(&column)
        {
            return Err(ApplicationError::new(ErrorType::Validation, format!("Chart {name} cannot be grouped by {column}")));
        }
        let mut unit_of_work = self.store.begin().await?;
        let loaded = load_rows(&mut unit_of_work, chart).await;
        let (resolver, rows) = unit_of_work.finish(loaded).await?;
        let rows = sort_rows(rows, chart.base_order);
        let datasets = match (group_by, chart.kind) {
            (Some(column), _) => vec![self.grouped(&resolver, chart.entity, &rows, None, column, chart.formatter_for(column), chart.aggregate_by_column)],
            (None, ChartKind::Grouped(definitions)) => definitions
                .iter()
                .map(|definition| self.grouped(&resolver, chart.entity, &rows, definition.label, definition.group, definition.formatter, definition.series))
                .collect(),
            (None, ChartKind::Direct(definitions)) => definitions.iter().map(|definition| self.direct(&resolver, chart.entity, &rows, definition)).collect(),
        };
        tracing::debug!("Chart {} produced {} datasets", chart.name, datasets.len());
        Ok(ChartOutput { name: chart.name, title: chart.title, chart_type: chart.chart_type, datasets })
    }

    #[allow(clippy::too_many_arguments)]
    fn grouped(&self, resolver: &RowResolver, entity: &EntityDef, rows: &[Row], label: Option<&str>, group: &str, formatter: Option<Formatter>, series: &[SeriesSpec]) -> Dataset {
        let chart_series: Vec<Series> = series.iter().map(|spec| Series { function: spec.function, source: self.source(resolver, entity, spec.column) }).collect();
        let points = aggregate::aggregate(rows, &self.source(resolver, entity, group), formatter, &chart_series)
            .into_iter()
            .map(|GroupRow { group, label, values }| ChartPoint { key: group, label, values })
            .collect();
        let columns = series.iter().map(|spec| format!("{} {}", spec.function.label(), prettify(spec.column))).collect();
        Dataset { label: label.map(str::to_string), columns, points }
    }

    fn direct(&self, resolver: &RowResolver, entity: &EntityDef, rows: &[Row], definition: &DirectDefinition) -> Dataset {
        let series: Vec<Source> = definition.series.iter().map(|column| self.source(resolver, entity, column)).collect();
        let points = aggregate::direct(rows, &self.source(resolver, entity, definition.x), &series)
            .into_iter()
            .map(|row| ChartPoint { key: row.x, label: row.label, values: row.values })
            .collect();
        Dataset { label: definition.label.map(str::to_string), columns: definition.series.iter().map(|column| prettify(column)).collect(), points }
    }

    /**
     * Stored fields are read straight from the row, anything else goes through the resolver.
     */
    fn source<'a>(&'a self, resolver: &'a RowResolver, entity: &EntityDef, column: &'a str) -> Source<'a> {
        if entity.field(column).is_some() {
            return Source::Column(column);
        }
        Source::Derived(Box::new(move |row: &Row| resolver.column(row, column, &self.context)))
    }
}

async fn load_rows(unit_of_work: &mut UnitOfWork<'_>, chart: &ChartView) -> Result<(RowResolver, Vec<Row>), ApplicationError> {
    let rows = unit_of_work.fetch_all(chart.entity, None).await?;
    let resolver = RowResolver::load(unit_of_work, chart.entity).await?;
    let rows = rows.iter().map(|row| resolver.resolve(row)).collect();
    Ok((resolver, rows))
}

/**
 * Stable sort on the chart's base order. Rows keep their id order otherwise.
 */
fn sort_rows(mut rows: Vec<Row>, order: Option<(&str, SortDirection)>) -> Vec<Row> {
    if let Some((column, direction)) = order {
        rows.sort_by(|left, right| {
            let ordering = left.get(column).compare(right.get(column));
            if direction == SortDirection::Desc { ordering.reverse() } else { ordering }
        });
    }
    rows
}

#[cfg(test)]
mod test {
    use std::collections::BTreeMap;

    use chrono::NaiveDate;

    use super::*;
    use crate::model::{
        charts::ChartType,
        schema::{CONTACT, CONTACT_GROUP, COUNTRY, COUNTRY_STATS, GENDER, POLITICAL_TYPE},
        value::Value,
    };

    fn values(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs.iter().map(|(column, value)| ((*column).to_string(), value.clone())).collect()
    }

    fn name(name: &str) -> BTreeMap<String, Value> {
        values(&[("name", Value::Text(name.to_string()))])
    }

    fn date(year: i32, month: u32, day: u32) -> Value {
        Value::Date(NaiveDate::from_ymd_opt(year, month, day).unwrap())
    }

    async fn country_service() -> ChartService {
        let store = Arc::new(Store::memory());
        let mut unit_of_work = store.begin().await.unwrap();
        let spain = unit_of_work.insert(&COUNTRY, &name("Spain")).await.unwrap();
        let portugal = unit_of_work.insert(&COUNTRY, &name("Portugal")).await.unwrap();
        let democratic = unit_of_work.insert(&POLITICAL_TYPE, &name("Democratic")).await.unwrap();
        for (country, unemployed, stat_date) in [(portugal, 10.0, date(2020, 2, 10)), (portugal, 20.0, date(2020, 1, 10)), (spain, 5.0, date(2020, 1, 20))] {
            let stats = values(&[
                ("country", Value::Integer(country)),
                ("political_type", Value::Integer(democratic)),
                ("unemployed", Value::Float(unemployed)),
                ("stat_date", stat_date),
            ]);
            unit_of_work.insert(&COUNTRY_STATS, &stats).await.unwrap();
        }
        unit_of_work.commit().await.unwrap();
        ChartService::new(store, ProjectionContext { image_upload_url: "/static/uploads/".to_string() })
    }

    #[tokio::test]
    async fn test_group_by_country() {
        let service = country_service().await;
        let chart = service.get_chart("country_group_by", Some("country")).await.unwrap();
        assert_eq!(chart.datasets.len(), 1);
        let dataset = &chart.datasets[0];
        assert_eq!(dataset.columns, vec!["Avg Unemployed", "Avg Population", "Avg College"]);
        let points: Vec<(&str, Option<f64>, Option<f64>)> = dataset.points.iter().map(|point| (point.label.as_str(), point.values[0], point.values[1])).collect();
        assert_eq!(points, vec![("Portugal", Some(15.0), None), ("Spain", Some(5.0), None)]);
    }

    #[tokio::test]
    async fn test_grouped_definitions() {
        let service = country_service().await;
        let chart = service.get_chart("country_group_by", None).await.unwrap();
        assert_eq!(chart.chart_type, ChartType::ColumnChart);
        assert_eq!(chart.datasets.len(), 2);
        assert_eq!(chart.datasets[0].label.as_deref(), Some("Country Stat"));
        let months: Vec<(&str, Option<f64>)> = chart.datasets[1].points.iter().map(|point| (point.label.as_str(), point.values[0])).collect();
        assert_eq!(months, vec![("January 2020", Some(25.0)), ("February 2020", Some(10.0))]);
    }

    #[tokio::test]
    async fn test_group_by_derived_column() {
        let service = country_service().await;
        let chart = service.get_chart("country_group_by", Some("country_political")).await.unwrap();
        let labels: Vec<&str> = chart.datasets[0].points.iter().map(|point| point.label.as_str()).collect();
        assert_eq!(labels, vec!["Portugal - Democratic", "Spain - Democratic"]);
    }

    #[tokio::test]
    async fn test_direct_sorted_by_x() {
        let service = country_service().await;
        let chart = service.get_chart("country_stats_direct", None).await.unwrap();
        let dataset = &chart.datasets[0];
        assert_eq!(dataset.columns, vec!["Population", "Unemployed", "College"]);
        let unemployed: Vec<Option<f64>> = dataset.points.iter().map(|point| point.values[1]).collect();
        assert_eq!(unemployed, vec![Some(20.0), Some(5.0), Some(10.0)]);
    }

    #[tokio::test]
    async fn test_invalid_group_and_unknown_chart() {
        let service = country_service().await;
        assert_eq!(service.get_chart("country_group_by", Some("population")).await.unwrap_err().error_type, ErrorType::Validation);
        assert_eq!(service.get_chart("missing", None).await.unwrap_err().error_type, ErrorType::NotFound);
    }

    #[tokio::test]
    async fn test_contacts_per_group_and_birth_year() {
        let store = Arc::new(Store::memory());
        let mut unit_of_work = store.begin().await.unwrap();
        let friends = unit_of_work.insert(&CONTACT_GROUP, &name("Friends")).await.unwrap();
        let family = unit_of_work.insert(&CONTACT_GROUP, &name("Family")).await.unwrap();
        let male = unit_of_work.insert(&GENDER, &name("Male")).await.unwrap();
        for (contact, group, birthday) in [("Ann", friends, date(1980, 3, 1)), ("Bob", family, Value::Null), ("Cid", friends, date(1980, 7, 4))] {
            let contact = values(&[("name", Value::Text(contact.to_string())), ("contact_group", Value::Integer(group)), ("gender", Value::Integer(male)), ("birthday", birthday)]);
            unit_of_work.insert(&CONTACT, &contact).await.unwrap();
        }
        unit_of_work.commit().await.unwrap();
        let service = ChartService::new(store, ProjectionContext { image_upload_url: String::new() });

        let chart = service.get_chart("contacts", None).await.unwrap();
        let groups: Vec<(&str, Option<f64>)> = chart.datasets[0].points.iter().map(|point| (point.label.as_str(), point.values[0])).collect();
        assert_eq!(groups, vec![("Family", Some(1.0)), ("Friends", Some(2.0))]);

        let chart = service.get_chart("contacts_birth", None).await.unwrap();
        let years: Vec<(&str, Option<f64>)> = chart.datasets[1].points.iter().map(|point| (point.label.as_str(), point.values[0])).collect();
        assert_eq!(years, vec![("1", Some(1.0)), ("1980", Some(2.0))]);
    }
}
