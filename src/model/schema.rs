use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::model::{
    apperror::{ApplicationError, ErrorType},
    derived::DerivedFunction,
    value::Value,
};

/**
 * Semantic type of a stored field.
 */
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldType {
    /**
     * Text with a maximum length in characters.
     */
    Text(usize),
    /**
     * Free text, optionally bounded.
     */
    LongText(Option<usize>),
    Integer,
    Float,
    Decimal,
    Date,
    /**
     * Reference to an uploaded image. Stored as the file name.
     */
    Image,
    /**
     * Many-to-one reference to the table with the given name.
     */
    Reference(&'static str),
}

/**
 * Value assigned to a field when an add form leaves it out.
 */
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldDefault {
    Today,
}

/**
 * Declaration of a single stored field.
 */
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldDef {
    pub name: &'static str,
    pub field_type: FieldType,
    pub nullable: bool,
    pub unique: bool,
    pub default: Option<FieldDefault>,
}

impl FieldDef {
    const fn new(name: &'static str, field_type: FieldType) -> Self {
        FieldDef { name, field_type, nullable: true, unique: false, default: None }
    }

    const fn required(self) -> Self {
        FieldDef { nullable: false, ..self }
    }

    const fn unique(self) -> Self {
        FieldDef { unique: true, ..self }
    }

    const fn default_today(self) -> Self {
        FieldDef { default: Some(FieldDefault::Today), ..self }
    }

    /**
     * Target table of a reference field.
     */
    pub fn reference_target(&self) -> Option<&'static str> {
        match self.field_type {
            FieldType::Reference(target) => Some(target),
            _ => None,
        }
    }

    /**
     * Maximum length of a text field, if bounded.
     */
    pub fn max_length(&self) -> Option<usize> {
        match self.field_type {
            FieldType::Text(max_length) => Some(max_length),
            FieldType::LongText(max_length) => max_length,
            _ => None,
        }
    }

    /**
     * Converts a JSON form value into a stored value.
     *
     * # Arguments
     * `input`: The submitted JSON value.
     *
     * # Returns
     * The parsed value or a message describing why the input is invalid.
     */
    pub fn parse(&self, input: &serde_json::Value) -> Result<Value, String> {
        if input.is_null() {
            return Ok(Value::Null);
        }
        match self.field_type {
            FieldType::Text(_) | FieldType::LongText(_) | FieldType::Image => {
                let text = input.as_str().ok_or_else(|| "Expected text".to_string())?;
                if self.max_length().is_some_and(|max_length| text.chars().count() > max_length) {
                    return Err("Value too long".to_string());
                }
                Ok(Value::Text(text.to_string()))
            }
            FieldType::Integer | FieldType::Reference(_) => input.as_i64().map(Value::Integer).ok_or_else(|| "Expected integer".to_string()),
            FieldType::Float => input.as_f64().map(Value::Float).ok_or_else(|| "Expected number".to_string()),
            FieldType::Decimal => {
                let raw = match input {
                    serde_json::Value::Number(number) => number.to_string(),
                    serde_json::Value::String(text) => text.clone(),
                    _ => return Err("Expected decimal".to_string()),
                };
                Decimal::from_str(&raw).map(Value::Decimal).map_err(|_err| "Expected decimal".to_string())
            }
            FieldType::Date => {
                let text = input.as_str().ok_or_else(|| "Expected date".to_string())?;
                NaiveDate::parse_from_str(text, "%Y-%m-%d").map(Value::Date).map_err(|_err| "Expected date in format YYYY-MM-DD".to_string())
            }
        }
    }
}

/**
 * Named read-only projection computed from stored fields.
 */
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedDef {
    pub name: &'static str,
    pub function: DerivedFunction,
}

/**
 * Many-to-many relation stored in an association table.
 */
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ManyToManyDef {
    pub name: &'static str,
    pub association: &'static str,
    pub local_column: &'static str,
    pub remote_column: &'static str,
    pub target: &'static str,
}

/**
 * Rows of `table` whose `column` references the deleted row are deleted with it.
 */
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CascadeDef {
    pub table: &'static str,
    pub column: &'static str,
}

/**
 * Rows of `table` record the periods during which `tracked` of the owning row had a given value.
 * `owner` references the owning row. Entries are opened on add and rotated when `tracked` changes.
 */
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryDef {
    pub table: &'static str,
    pub owner: &'static str,
    pub tracked: &'static str,
    pub begin: &'static str,
    pub end: &'static str,
}

/**
 * Declarative definition of an entity.
 */
#[derive(Debug, PartialEq)]
pub struct EntityDef {
    pub name: &'static str,
    pub table: &'static str,
    pub fields: &'static [FieldDef],
    pub display_field: Option<&'static str>,
    pub derived: &'static [DerivedDef],
    pub many_to_many: &'static [ManyToManyDef],
    pub cascades: &'static [CascadeDef],
    pub history: Option<HistoryDef>,
}

impl EntityDef {
    pub fn field(&self, name: &str) -> Option<&'static FieldDef> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn derived(&self, name: &str) -> Option<&'static DerivedDef> {
        self.derived.iter().find(|derived| derived.name == name)
    }

    pub fn many_to_many(&self, name: &str) -> Option<&'static ManyToManyDef> {
        self.many_to_many.iter().find(|relation| relation.name == name)
    }

    /**
     * Whether `name` is something a view can show: a field, a derived projection, a many-to-many relation,
     * or a dotted path through a reference.
     */
    pub fn has_column(&self, name: &str) -> bool {
        if let Some((reference, _)) = name.split_once('.') {
            return self.field(reference).and_then(FieldDef::reference_target).is_some();
        }
        self.field(name).is_some() || self.derived(name).is_some() || self.many_to_many(name).is_some()
    }

    /**
     * Reference field of this entity pointing at `table`.
     */
    pub fn reference_to(&self, table: &str) -> Option<&'static FieldDef> {
        self.fields.iter().find(|field| field.reference_target() == Some(table))
    }
}

const fn text(name: &'static str, max_length: usize) -> FieldDef {
    FieldDef::new(name, FieldType::Text(max_length))
}

const fn reference(name: &'static str, target: &'static str) -> FieldDef {
    FieldDef::new(name, FieldType::Reference(target))
}

const NAME_FIELDS: &[FieldDef] = &[text("name", 50).required().unique()];

pub static COUNTRY: EntityDef = EntityDef { name: "Country", table: "country", fields: NAME_FIELDS, display_field: Some("name"), derived: &[], many_to_many: &[], cascades: &[], history: None };

pub static POLITICAL_TYPE: EntityDef = EntityDef { name: "PoliticalType", table: "political_type", fields: NAME_FIELDS, display_field: Some("name"), derived: &[], many_to_many: &[], cascades: &[], history: None };

pub static COUNTRY_STATS: EntityDef = EntityDef {
    name: "CountryStats",
    table: "country_stats",
    fields: &[
        FieldDef::new("stat_date", FieldType::Date),
        FieldDef::new("population", FieldType::Float),
        FieldDef::new("unemployed", FieldType::Float),
        FieldDef::new("college", FieldType::Float),
        reference("country", "country").required(),
        reference("political_type", "political_type").required(),
    ],
    display_field: None,
    derived: &[
        DerivedDef { name: "month_year", function: DerivedFunction::MonthYear("stat_date") },
        DerivedDef { name: "country_political", function: DerivedFunction::Concat(&["country", "political_type"], " - ") },
    ],
    many_to_many: &[],
    cascades: &[],
    history: None,
};

pub static PRODUCT_TYPE: EntityDef = EntityDef { name: "ProductType", table: "product_type", fields: NAME_FIELDS, display_field: Some("name"), derived: &[], many_to_many: &[], cascades: &[], history: None };

pub static PRODUCT: EntityDef = EntityDef {
    name: "Product",
    table: "product",
    fields: &[
        text("name", 50).required().unique(),
        FieldDef::new("price", FieldType::Decimal).required(),
        FieldDef::new("photo", FieldType::Image),
        FieldDef::new("description", FieldType::LongText(None)),
        reference("product_type", "product_type").required(),
    ],
    display_field: Some("name"),
    derived: &[
        DerivedDef { name: "price_label", function: DerivedFunction::PriceLabel("price") },
        DerivedDef { name: "photo_img", function: DerivedFunction::PhotoImage { photo: "photo", view: "products_public" } },
    ],
    many_to_many: &[],
    cascades: &[],
    history: None,
};

pub static DEPARTMENT: EntityDef = EntityDef { name: "Department", table: "department", fields: NAME_FIELDS, display_field: Some("name"), derived: &[], many_to_many: &[], cascades: &[], history: None };

pub static FUNCTION: EntityDef = EntityDef { name: "Function", table: "function", fields: NAME_FIELDS, display_field: Some("name"), derived: &[], many_to_many: &[], cascades: &[], history: None };

pub static BENEFIT: EntityDef = EntityDef {
    name: "Benefit",
    table: "benefit",
    fields: NAME_FIELDS,
    display_field: Some("name"),
    derived: &[],
    many_to_many: &[],
    cascades: &[CascadeDef { table: "benefits_employee", column: "benefit_id" }],
    history: None,
};

pub static EMPLOYEE: EntityDef = EntityDef {
    name: "Employee",
    table: "employee",
    fields: &[
        text("full_name", 150).required(),
        FieldDef::new("address", FieldType::LongText(Some(250))).required(),
        FieldDef::new("fiscal_number", FieldType::Integer).required(),
        FieldDef::new("employee_number", FieldType::Integer).required(),
        reference("department", "department").required(),
        reference("function", "function").required(),
        FieldDef::new("begin_date", FieldType::Date).default_today(),
        FieldDef::new("end_date", FieldType::Date).default_today(),
    ],
    display_field: Some("full_name"),
    derived: &[],
    many_to_many: &[ManyToManyDef { name: "benefits", association: "benefits_employee", local_column: "employee_id", remote_column: "benefit_id", target: "benefit" }],
    cascades: &[CascadeDef { table: "benefits_employee", column: "employee_id" }, CascadeDef { table: "employee_history", column: "employee" }],
    history: Some(HistoryDef { table: "employee_history", owner: "employee", tracked: "department", begin: "begin_date", end: "end_date" }),
};

pub static BENEFITS_EMPLOYEE: EntityDef = EntityDef {
    name: "BenefitsEmployee",
    table: "benefits_employee",
    fields: &[reference("benefit_id", "benefit"), reference("employee_id", "employee")],
    display_field: None,
    derived: &[],
    many_to_many: &[],
    cascades: &[],
    history: None,
};

pub static EMPLOYEE_HISTORY: EntityDef = EntityDef {
    name: "EmployeeHistory",
    table: "employee_history",
    fields: &[
        reference("department", "department").required(),
        reference("employee", "employee").required(),
        FieldDef::new("begin_date", FieldType::Date).default_today(),
        FieldDef::new("end_date", FieldType::Date),
    ],
    display_field: None,
    derived: &[],
    many_to_many: &[],
    cascades: &[],
    history: None,
};

pub static CONTACT_GROUP: EntityDef = EntityDef { name: "ContactGroup", table: "contact_group", fields: NAME_FIELDS, display_field: Some("name"), derived: &[], many_to_many: &[], cascades: &[], history: None };

pub static GENDER: EntityDef = EntityDef { name: "Gender", table: "gender", fields: NAME_FIELDS, display_field: Some("name"), derived: &[], many_to_many: &[], cascades: &[], history: None };

pub static CONTACT: EntityDef = EntityDef {
    name: "Contact",
    table: "contact",
    fields: &[
        text("name", 150).required().unique(),
        text("address", 564),
        FieldDef::new("birthday", FieldType::Date),
        text("personal_phone", 20),
        text("personal_celphone", 20),
        reference("contact_group", "contact_group").required(),
        reference("gender", "gender").required(),
    ],
    display_field: Some("name"),
    derived: &[
        DerivedDef { name: "month_year", function: DerivedFunction::MonthYear("birthday") },
        DerivedDef { name: "year", function: DerivedFunction::Year("birthday") },
    ],
    many_to_many: &[],
    cascades: &[],
    history: None,
};

pub static MODEL_OM_PARENT: EntityDef = EntityDef {
    name: "ModelOMParent",
    table: "model_om_parent",
    fields: &[text("field_string", 50).required().unique()],
    display_field: Some("field_string"),
    derived: &[],
    many_to_many: &[],
    cascades: &[CascadeDef { table: "model_om_child", column: "parent" }],
    history: None,
};

pub static MODEL_OM_CHILD: EntityDef = EntityDef {
    name: "ModelOMChild",
    table: "model_om_child",
    fields: &[text("field_string", 50).required().unique(), reference("parent", "model_om_parent")],
    display_field: Some("field_string"),
    derived: &[],
    many_to_many: &[],
    cascades: &[],
    history: None,
};

/**
 * All entities, ordered so that every referenced table comes before the tables referencing it.
 */
pub static ENTITIES: &[&EntityDef] = &[
    &COUNTRY,
    &POLITICAL_TYPE,
    &COUNTRY_STATS,
    &PRODUCT_TYPE,
    &PRODUCT,
    &DEPARTMENT,
    &FUNCTION,
    &BENEFIT,
    &EMPLOYEE,
    &BENEFITS_EMPLOYEE,
    &EMPLOYEE_HISTORY,
    &CONTACT_GROUP,
    &GENDER,
    &CONTACT,
    &MODEL_OM_PARENT,
    &MODEL_OM_CHILD,
];

/**
 * Looks up an entity by table name.
 *
 * # Arguments
 * `table`: The table name of the entity.
 *
 * # Returns
 * The entity definition or a `NotFound` error.
 */
pub fn entity(table: &str) -> Result<&'static EntityDef, ApplicationError> {
    ENTITIES.iter().copied().find(|entity| entity.table == table).ok_or_else(|| ApplicationError::new(ErrorType::NotFound, format!("Unknown entity {table}")))
}

/**
 * Fields of other entities that reference `table`.
 */
pub fn referencing_fields(table: &str) -> Vec<(&'static EntityDef, &'static FieldDef)> {
    ENTITIES
        .iter()
        .copied()
        .flat_map(|entity| entity.fields.iter().filter(move |field| field.reference_target() == Some(table)).map(move |field| (entity, field)))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_references_point_backwards() {
        for (position, entity) in ENTITIES.iter().enumerate() {
            for field in entity.fields {
                if let Some(target) = field.reference_target() {
                    let target_position = ENTITIES.iter().position(|candidate| candidate.table == target).unwrap();
                    assert!(target_position < position, "{} references {} defined later", entity.table, target);
                }
            }
        }
    }

    #[test]
    fn test_cascades_target_referencing_columns() {
        for entity in ENTITIES {
            for cascade in entity.cascades {
                let child = super::entity(cascade.table).unwrap();
                assert_eq!(child.field(cascade.column).and_then(FieldDef::reference_target), Some(entity.table));
            }
        }
    }

    #[test]
    fn test_parse_text_too_long() {
        let field = COUNTRY.field("name").unwrap();
        let long_name = "x".repeat(51);
        assert_eq!(field.parse(&serde_json::json!(long_name)), Err("Value too long".to_string()));
        assert_eq!(field.parse(&serde_json::json!("Portugal")), Ok(Value::Text("Portugal".to_string())));
    }

    #[test]
    fn test_parse_date_and_decimal() {
        let stat_date = COUNTRY_STATS.field("stat_date").unwrap();
        assert_eq!(stat_date.parse(&serde_json::json!("2020-02-29")), Ok(Value::Date(NaiveDate::from_ymd_opt(2020, 2, 29).unwrap())));
        assert!(stat_date.parse(&serde_json::json!("29/02/2020")).is_err());
        let price = PRODUCT.field("price").unwrap();
        assert_eq!(price.parse(&serde_json::json!("12.50")), Ok(Value::Decimal(Decimal::new(1250, 2))));
        assert_eq!(price.parse(&serde_json::json!(3)), Ok(Value::Decimal(Decimal::from(3))));
        assert!(price.parse(&serde_json::json!(true)).is_err());
    }

    #[test]
    fn test_history_columns_exist() {
        for entity in ENTITIES {
            if let Some(history) = entity.history {
                let history_entity = super::entity(history.table).unwrap();
                assert_eq!(history_entity.field(history.owner).and_then(FieldDef::reference_target), Some(entity.table));
                assert_eq!(history_entity.field(history.tracked).map(|field| field.field_type), entity.field(history.tracked).map(|field| field.field_type));
                assert!(history_entity.field(history.begin).is_some() && history_entity.field(history.end).is_some());
            }
        }
    }

    #[test]
    fn test_has_column() {
        assert!(EMPLOYEE.has_column("department.name"));
        assert!(EMPLOYEE.has_column("benefits"));
        assert!(COUNTRY_STATS.has_column("country_political"));
        assert!(!EMPLOYEE.has_column("full_name.name"));
        assert!(!COUNTRY.has_column("population"));
    }

    #[test]
    fn test_referencing_fields() {
        let referencing = referencing_fields("employee");
        let tables: Vec<&str> = referencing.iter().map(|(entity, _)| entity.table).collect();
        assert_eq!(tables, vec!["benefits_employee", "employee_history"]);
    }
}
