use chrono::{Datelike, NaiveDate};

use crate::model::{models::Row, value::Value};

/**
 * Settings needed to render derived display columns.
 */
#[derive(Debug, Clone)]
pub struct ProjectionContext {
    /**
     * URL prefix under which uploaded images are served.
     */
    pub image_upload_url: String,
}

/**
 * Pure projection over the stored fields of a row.
 */
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DerivedFunction {
    /**
     * First day of the month of the date column.
     */
    MonthYear(&'static str),
    /**
     * January 1st of the year of the date column.
     */
    Year(&'static str),
    /**
     * Display values of the columns joined by the separator.
     */
    Concat(&'static [&'static str], &'static str),
    PriceLabel(&'static str),
    /**
     * Thumbnail markup linking to the show route of `view`.
     */
    PhotoImage { photo: &'static str, view: &'static str },
}

impl DerivedFunction {
    /**
     * Evaluates the projection on a row.
     *
     * # Arguments
     * `row`: The row, with references already resolved to labels.
     * `context`: Rendering settings.
     *
     * # Returns
     * The derived value.
     */
    pub fn evaluate(&self, row: &Row, context: &ProjectionContext) -> Value {
        match self {
            DerivedFunction::MonthYear(column) => Value::Date(month_year(row.get(column).as_date())),
            DerivedFunction::Year(column) => Value::Date(year(row.get(column).as_date())),
            DerivedFunction::Concat(columns, separator) => Value::Text(columns.iter().map(|column| row.get(column).display()).collect::<Vec<String>>().join(*separator)),
            DerivedFunction::PriceLabel(column) => Value::Text(price_label(row.get(column))),
            DerivedFunction::PhotoImage { photo, view } => Value::Text(photo_img(row.id, row.get(photo).as_text(), view, &context.image_upload_url)),
        }
    }
}

/**
 * Sentinel used in place of an absent date.
 */
pub fn min_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1, 1, 1).unwrap_or(NaiveDate::MIN)
}

/**
 * First day of the month of `date`, or of the sentinel date when absent.
 */
pub fn month_year(date: Option<NaiveDate>) -> NaiveDate {
    let date = date.unwrap_or_else(min_date);
    date.with_day(1).unwrap_or(date)
}

/**
 * January 1st of the year of `date`, or of the sentinel date when absent.
 */
pub fn year(date: Option<NaiveDate>) -> NaiveDate {
    let date = date.unwrap_or_else(min_date);
    NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date)
}

pub fn price_label(price: &Value) -> String {
    format!("Price:<strong> {} </strong>", price.display())
}

/**
 * Thumbnail markup for a product photo.
 *
 * # Arguments
 * `id`: Id of the product row.
 * `photo`: Stored image reference, if any.
 * `view`: View whose show route the thumbnail links to.
 * `image_upload_url`: URL prefix of uploaded images.
 */
pub fn photo_img(id: i64, photo: Option<&str>, view: &str, image_upload_url: &str) -> String {
    let show_url = format!("/api/v1/views/{view}/{id}");
    match photo.filter(|photo| !photo.is_empty()) {
        Some(photo) => format!(r#"<a href="{show_url}" class="thumbnail"><img src="{image_upload_url}{photo}" alt="Photo" class="img-rounded img-responsive"></a>"#),
        None => format!(r#"<a href="{show_url}" class="thumbnail"><img src="//:0" alt="Photo" class="img-responsive"></a>"#),
    }
}
