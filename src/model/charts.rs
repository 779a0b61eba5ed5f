use chrono::{Datelike, Month};

use crate::model::{
    apperror::{ApplicationError, ErrorType},
    models::SortDirection,
    schema::{CONTACT, COUNTRY_STATS, EntityDef},
    value::Value,
};

/**
 * Aggregate computed over the rows of a group.
 */
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AggregateFunction {
    Avg,
    Sum,
    Min,
    Max,
    Count,
}

impl AggregateFunction {
    pub fn label(&self) -> &'static str {
        match self {
            AggregateFunction::Avg => "Avg",
            AggregateFunction::Sum => "Sum",
            AggregateFunction::Min => "Min",
            AggregateFunction::Max => "Max",
            AggregateFunction::Count => "Count",
        }
    }
}

/**
 * Turns a raw group key into a display label.
 */
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Formatter {
    /**
     * `January 2020`.
     */
    PrettyMonthYear,
    /**
     * `2020`.
     */
    PrettyYear,
}

impl Formatter {
    pub fn format(&self, value: &Value) -> String {
        let Some(date) = value.as_date() else {
            return value.display();
        };
        match self {
            Formatter::PrettyMonthYear => {
                let month = u8::try_from(date.month()).ok().and_then(|month| Month::try_from(month).ok()).map_or("", |month| month.name());
                format!("{month} {}", date.year())
            }
            Formatter::PrettyYear => date.year().to_string(),
        }
    }
}

/**
 * Aggregate function applied to a column or derived projection.
 */
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesSpec {
    pub function: AggregateFunction,
    pub column: &'static str,
}

const fn series(function: AggregateFunction, column: &'static str) -> SeriesSpec {
    SeriesSpec { function, column }
}

/**
 * One grouped dataset of a chart.
 */
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupDefinition {
    pub label: Option<&'static str>,
    pub group: &'static str,
    pub formatter: Option<Formatter>,
    pub series: &'static [SeriesSpec],
}

/**
 * One direct dataset of a chart: a point per row and series.
 */
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectDefinition {
    pub label: Option<&'static str>,
    pub x: &'static str,
    pub series: &'static [&'static str],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChartKind {
    Direct(&'static [DirectDefinition]),
    Grouped(&'static [GroupDefinition]),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChartType {
    LineChart,
    ColumnChart,
    PieChart,
}

impl ChartType {
    pub fn name(&self) -> &'static str {
        match self {
            ChartType::LineChart => "LineChart",
            ChartType::ColumnChart => "ColumnChart",
            ChartType::PieChart => "PieChart",
        }
    }
}

/**
 * Chart bound to an entity.
 *
 * Grouped charts may additionally let the caller pick the group column among `group_by_columns`,
 * in which case the dataset is aggregated with `aggregate_by_column`.
 */
#[derive(Debug)]
pub struct ChartView {
    pub name: &'static str,
    pub title: &'static str,
    pub chart_type: ChartType,
    pub entity: &'static EntityDef,
    pub kind: ChartKind,
    pub base_order: Option<(&'static str, SortDirection)>,
    pub group_by_columns: &'static [&'static str],
    pub aggregate_by_column: &'static [SeriesSpec],
    pub formatter_by_columns: &'static [(&'static str, Formatter)],
}

impl ChartView {
    pub fn formatter_for(&self, column: &str) -> Option<Formatter> {
        self.formatter_by_columns.iter().find(|(name, _)| *name == column).map(|(_, formatter)| *formatter)
    }
}

/**
 * A point of a dataset: the raw key, its label and one value per series.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct ChartPoint {
    pub key: Value,
    pub label: String,
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub label: Option<String>,
    /**
     * Header of each series, in the order of `ChartPoint::values`.
     */
    pub columns: Vec<String>,
    pub points: Vec<ChartPoint>,
}

/**
 * Chart ready data of a chart view.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct ChartOutput {
    pub name: &'static str,
    pub title: &'static str,
    pub chart_type: ChartType,
    pub datasets: Vec<Dataset>,
}

pub static COUNTRY_STATS_DIRECT_CHART: ChartView = ChartView {
    name: "country_stats_direct",
    title: "Statistics",
    chart_type: ChartType::LineChart,
    entity: &COUNTRY_STATS,
    kind: ChartKind::Direct(&[DirectDefinition { label: Some("General Stats"), x: "stat_date", series: &["population", "unemployed", "college"] }]),
    base_order: Some(("stat_date", SortDirection::Asc)),
    group_by_columns: &[],
    aggregate_by_column: &[],
    formatter_by_columns: &[],
};

pub static COUNTRY_DIRECT_CHART: ChartView = ChartView {
    name: "country_direct",
    title: "Direct Data",
    chart_type: ChartType::ColumnChart,
    entity: &COUNTRY_STATS,
    kind: ChartKind::Direct(&[DirectDefinition { label: None, x: "stat_date", series: &["unemployed", "college"] }]),
    base_order: None,
    group_by_columns: &[],
    aggregate_by_column: &[],
    formatter_by_columns: &[],
};

pub static COUNTRY_GROUP_BY_CHART: ChartView = ChartView {
    name: "country_group_by",
    title: "Statistics",
    chart_type: ChartType::ColumnChart,
    entity: &COUNTRY_STATS,
    kind: ChartKind::Grouped(&[
        GroupDefinition {
            label: Some("Country Stat"),
            group: "country",
            formatter: None,
            series: &[series(AggregateFunction::Avg, "unemployed"), series(AggregateFunction::Avg, "population"), series(AggregateFunction::Avg, "college")],
        },
        GroupDefinition {
            label: None,
            group: "month_year",
            formatter: Some(Formatter::PrettyMonthYear),
            series: &[series(AggregateFunction::Sum, "unemployed"), series(AggregateFunction::Avg, "population"), series(AggregateFunction::Avg, "college")],
        },
    ]),
    base_order: None,
    group_by_columns: &["country", "political_type", "country_political", "month_year"],
    aggregate_by_column: &[series(AggregateFunction::Avg, "unemployed"), series(AggregateFunction::Avg, "population"), series(AggregateFunction::Avg, "college")],
    formatter_by_columns: &[("month_year", Formatter::PrettyMonthYear)],
};

pub static CONTACT_CHART: ChartView = ChartView {
    name: "contacts",
    title: "Grouped contacts",
    chart_type: ChartType::PieChart,
    entity: &CONTACT,
    kind: ChartKind::Grouped(&[GroupDefinition { label: Some("Group"), group: "contact_group", formatter: None, series: &[series(AggregateFunction::Count, "contact_group")] }]),
    base_order: None,
    group_by_columns: &["contact_group", "gender"],
    aggregate_by_column: &[series(AggregateFunction::Count, "name")],
    formatter_by_columns: &[],
};

pub static CONTACT_BIRTH_CHART: ChartView = ChartView {
    name: "contacts_birth",
    title: "Contacts Birth",
    chart_type: ChartType::ColumnChart,
    entity: &CONTACT,
    kind: ChartKind::Grouped(&[
        GroupDefinition { label: None, group: "month_year", formatter: Some(Formatter::PrettyMonthYear), series: &[series(AggregateFunction::Count, "name")] },
        GroupDefinition { label: None, group: "year", formatter: Some(Formatter::PrettyYear), series: &[series(AggregateFunction::Count, "name")] },
    ]),
    base_order: None,
    group_by_columns: &[],
    aggregate_by_column: &[],
    formatter_by_columns: &[],
};

pub static CHARTS: &[&ChartView] = &[&COUNTRY_STATS_DIRECT_CHART, &COUNTRY_DIRECT_CHART, &COUNTRY_GROUP_BY_CHART, &CONTACT_CHART, &CONTACT_BIRTH_CHART];

/**
 * Looks up a registered chart by name.
 */
pub fn chart(name: &str) -> Result<&'static ChartView, ApplicationError> {
    CHARTS.iter().copied().find(|chart| chart.name == name).ok_or_else(|| ApplicationError::new(ErrorType::NotFound, format!("Unknown chart {name}")))
}
