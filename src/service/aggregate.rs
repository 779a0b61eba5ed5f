use crate::model::{
    charts::{AggregateFunction, Formatter},
    models::Row,
    value::Value,
};

/**
 * Label of the group collecting rows without a group value.
 */
pub const ABSENT_GROUP_LABEL: &str = "(none)";

/**
 * Where the values of a group key or series come from.
 */
pub enum Source<'a> {
    /**
     * A stored column of the row.
     */
    Column(&'a str),
    /**
     * A projection computed from the row.
     */
    Derived(Box<dyn Fn(&Row) -> Value + 'a>),
}

impl Source<'_> {
    pub fn value(&self, row: &Row) -> Value {
        match self {
            Source::Column(column) => row.get(column).clone(),
            Source::Derived(function) => function(row),
        }
    }
}

/**
 * Aggregate function applied to a source.
 */
pub struct Series<'a> {
    pub function: AggregateFunction,
    pub source: Source<'a>,
}

/**
 * One output row of a grouped aggregation.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct GroupRow {
    /**
     * Raw group key, used for ordering.
     */
    pub group: Value,
    /**
     * Display label of the group key.
     */
    pub label: String,
    /**
     * One value per series. `None` when no row of the group had a numeric value.
     */
    pub values: Vec<Option<f64>>,
}

/**
 * One output row of a direct dataset.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct DirectRow {
    pub x: Value,
    pub label: String,
    pub values: Vec<Option<f64>>,
}

/**
 * Groups rows by a key and computes each series per group.
 *
 * # Arguments
 * `rows`: Input rows.
 * `group`: Source of the group key.
 * `formatter`: Optional formatter turning the raw key into its label.
 * `series`: Aggregates to compute.
 *
 * # Returns
 * One row per distinct group key, ascending by raw key. Rows without a key form a single group sorted first.
 */
pub fn aggregate(rows: &[Row], group: &Source, formatter: Option<Formatter>, series: &[Series]) -> Vec<GroupRow> {
    let mut keyed: Vec<(Value, &Row)> = rows.iter().map(|row| (group.value(row), row)).collect();
    keyed.sort_by(|(left, _), (right, _)| left.compare(right));
    keyed
        .chunk_by(|(left, _), (right, _)| left.compare(right).is_eq())
        .map(|chunk| {
            let key = chunk[0].0.clone();
            let members: Vec<&Row> = chunk.iter().map(|(_, row)| *row).collect();
            let values = series.iter().map(|series| compute(series.function, members.iter().map(|row| series.source.value(row)))).collect();
            GroupRow { label: group_label(&key, formatter), group: key, values }
        })
        .collect()
}

/**
 * One data point per row and series, ascending by the x value. Rows with equal x keep their input order.
 *
 * # Arguments
 * `rows`: Input rows.
 * `x`: Source of the x value.
 * `series`: Sources of the plotted values.
 *
 * # Returns
 * The data points.
 */
pub fn direct(rows: &[Row], x: &Source, series: &[Source]) -> Vec<DirectRow> {
    let mut points: Vec<DirectRow> = rows
        .iter()
        .map(|row| {
            let x = x.value(row);
            DirectRow { label: group_label(&x, None), values: series.iter().map(|source| source.value(row).as_number()).collect(), x }
        })
        .collect();
    points.sort_by(|left, right| left.x.compare(&right.x));
    points
}

fn group_label(key: &Value, formatter: Option<Formatter>) -> String {
    if key.is_null() {
        return ABSENT_GROUP_LABEL.to_string();
    }
    formatter.map_or_else(|| key.display(), |formatter| formatter.format(key))
}

/**
 * Computes an aggregate over the values of a group. Values that are not numbers are left out,
 * except for `Count` which counts every non null value.
 */
fn compute(function: AggregateFunction, values: impl Iterator<Item = Value>) -> Option<f64> {
    if function == AggregateFunction::Count {
        return Some(values.filter(|value| !value.is_null()).count() as f64);
    }
    let numbers: Vec<f64> = values.filter_map(|value| value.as_number()).collect();
    if numbers.is_empty() {
        return None;
    }
    match function {
        AggregateFunction::Avg => Some(numbers.iter().sum::<f64>() / numbers.len() as f64),
        AggregateFunction::Sum => Some(numbers.iter().sum()),
        AggregateFunction::Min => numbers.iter().copied().reduce(f64::min),
        AggregateFunction::Max => numbers.iter().copied().reduce(f64::max),
        AggregateFunction::Count => Some(numbers.len() as f64),
    }
}

#[cfg(test)]
mod test {
    use chrono::NaiveDate;

    use super::*;
    use crate::model::{derived::month_year, value::Related};

    fn stat(id: i64, country: &str, country_id: i64, unemployed: Value) -> Row {
        Row::new(id).with("country", Value::Related(Related::new(country_id, country.to_string()))).with("unemployed", unemployed)
    }

    fn avg_unemployed() -> Vec<Series<'static>> {
        vec![Series { function: AggregateFunction::Avg, source: Source::Column("unemployed") }]
    }

    #[test]
    fn test_average_by_country() {
        let rows = vec![stat(1, "Spain", 2, Value::Float(5.0)), stat(2, "Portugal", 1, Value::Float(10.0)), stat(3, "Portugal", 1, Value::Float(20.0))];
        let result = aggregate(&rows, &Source::Column("country"), None, &avg_unemployed());
        let labels: Vec<(&str, Option<f64>)> = result.iter().map(|row| (row.label.as_str(), row.values[0])).collect();
        assert_eq!(labels, vec![("Portugal", Some(15.0)), ("Spain", Some(5.0))]);
    }

    #[test]
    fn test_empty_input() {
        assert!(aggregate(&[], &Source::Column("country"), None, &avg_unemployed()).is_empty());
        assert!(direct(&[], &Source::Column("stat_date"), &[Source::Column("unemployed")]).is_empty());
    }

    #[test]
    fn test_null_values_excluded_from_average() {
        let rows = vec![stat(1, "Portugal", 1, Value::Float(10.0)), stat(2, "Portugal", 1, Value::Null), stat(3, "Spain", 2, Value::Text("n/a".to_string()))];
        let result = aggregate(&rows, &Source::Column("country"), None, &avg_unemployed());
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].values, vec![Some(10.0)]);
        assert_eq!(result[1].values, vec![None]);
    }

    #[test]
    fn test_absent_group_sorted_first() {
        let rows = vec![Row::new(1).with("gender", Value::Text("Male".to_string())), Row::new(2), Row::new(3)];
        let count = vec![Series { function: AggregateFunction::Count, source: Source::Derived(Box::new(|row: &Row| Value::Integer(row.id))) }];
        let result = aggregate(&rows, &Source::Column("gender"), None, &count);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].label, ABSENT_GROUP_LABEL);
        assert_eq!(result[0].values, vec![Some(2.0)]);
        assert_eq!(result[1].label, "Male");
    }

    #[test]
    fn test_derived_group_with_formatter() {
        let date = |year, month, day| Value::Date(NaiveDate::from_ymd_opt(year, month, day).unwrap());
        let rows = vec![
            Row::new(1).with("stat_date", date(2020, 2, 15)).with("unemployed", Value::Float(1.0)),
            Row::new(2).with("stat_date", date(2020, 1, 3)).with("unemployed", Value::Float(2.0)),
            Row::new(3).with("stat_date", date(2020, 2, 1)).with("unemployed", Value::Float(4.0)),
        ];
        let group = Source::Derived(Box::new(|row: &Row| Value::Date(month_year(row.get("stat_date").as_date()))));
        let series = vec![
            Series { function: AggregateFunction::Sum, source: Source::Column("unemployed") },
            Series { function: AggregateFunction::Min, source: Source::Column("unemployed") },
            Series { function: AggregateFunction::Max, source: Source::Column("unemployed") },
            Series { function: AggregateFunction::Count, source: Source::Column("unemployed") },
        ];
        let result = aggregate(&rows, &group, Some(Formatter::PrettyMonthYear), &series);
        assert_eq!(result.iter().map(|row| row.label.as_str()).collect::<Vec<&str>>(), vec!["January 2020", "February 2020"]);
        assert_eq!(result[1].values, vec![Some(5.0), Some(1.0), Some(4.0), Some(2.0)]);
        assert_eq!(result, aggregate(&rows, &group, Some(Formatter::PrettyMonthYear), &series));
    }

    #[test]
    fn test_direct_is_stable() {
        let rows = vec![
            Row::new(1).with("stat_date", Value::Integer(2)).with("unemployed", Value::Float(1.0)),
            Row::new(2).with("stat_date", Value::Integer(1)).with("unemployed", Value::Float(2.0)),
            Row::new(3).with("stat_date", Value::Integer(2)).with("unemployed", Value::Null),
        ];
        let result = direct(&rows, &Source::Column("stat_date"), &[Source::Column("unemployed")]);
        let values: Vec<Option<f64>> = result.iter().map(|row| row.values[0]).collect();
        assert_eq!(values, vec![Some(2.0), Some(1.0), None]);
    }
}
