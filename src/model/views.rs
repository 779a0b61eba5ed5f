use crate::model::{
    apperror::{ApplicationError, ErrorType},
    models::SortDirection,
    schema::{CONTACT, CONTACT_GROUP, COUNTRY, COUNTRY_STATS, DEPARTMENT, EMPLOYEE, EMPLOYEE_HISTORY, EntityDef, BENEFIT, FUNCTION, MODEL_OM_CHILD, MODEL_OM_PARENT, POLITICAL_TYPE, PRODUCT, PRODUCT_TYPE},
};

/**
 * Operation a view allows.
 */
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Permission {
    List,
    Show,
    Add,
    Edit,
    Delete,
}

impl Permission {
    pub fn name(&self) -> &'static str {
        match self {
            Permission::List => "can_list",
            Permission::Show => "can_show",
            Permission::Add => "can_add",
            Permission::Edit => "can_edit",
            Permission::Delete => "can_delete",
        }
    }
}

const ALL_PERMISSIONS: &[Permission] = &[Permission::List, Permission::Show, Permission::Add, Permission::Edit, Permission::Delete];

/**
 * Widget a rendering collaborator should use.
 */
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Widget {
    Table,
    Block,
}

/**
 * Named group of fields on a show, add or edit surface.
 */
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fieldset {
    pub name: &'static str,
    pub fields: &'static [&'static str],
    pub expanded: bool,
}

/**
 * What an action does to each selected record.
 */
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActionKind {
    /**
     * Deletes every selected record.
     */
    Delete,
    /**
     * Sets the column to a fixed text.
     */
    SetText { column: &'static str, value: &'static str },
}

/**
 * Record level action offered by a view.
 */
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionDef {
    pub name: &'static str,
    pub text: &'static str,
    pub confirmation: &'static str,
    pub icon: &'static str,
    /**
     * Offered on a multiple selection in the list.
     */
    pub multiple: bool,
    /**
     * Offered on a single record.
     */
    pub single: bool,
    pub kind: ActionKind,
}

/**
 * Per view configuration consumed by a generic list/show/add/edit renderer.
 *
 * Empty column lists fall back to the entity's fields.
 */
#[derive(Debug)]
pub struct ViewConfig {
    pub name: &'static str,
    pub entity: &'static EntityDef,
    pub label_columns: &'static [(&'static str, &'static str)],
    pub list_columns: &'static [&'static str],
    pub show_columns: &'static [&'static str],
    pub add_columns: &'static [&'static str],
    pub edit_columns: &'static [&'static str],
    pub show_fieldsets: &'static [Fieldset],
    pub add_fieldsets: &'static [Fieldset],
    pub edit_fieldsets: &'static [Fieldset],
    pub search_columns: &'static [&'static str],
    pub base_order: Option<(&'static str, SortDirection)>,
    pub permissions: &'static [Permission],
    pub actions: &'static [ActionDef],
    pub related_views: &'static [&'static str],
    pub list_widget: Widget,
    pub show_widget: Widget,
}

impl ViewConfig {
    const fn new(name: &'static str, entity: &'static EntityDef) -> Self {
        ViewConfig {
            name,
            entity,
            label_columns: &[],
            list_columns: &[],
            show_columns: &[],
            add_columns: &[],
            edit_columns: &[],
            show_fieldsets: &[],
            add_fieldsets: &[],
            edit_fieldsets: &[],
            search_columns: &[],
            base_order: None,
            permissions: ALL_PERMISSIONS,
            actions: &[],
            related_views: &[],
            list_widget: Widget::Table,
            show_widget: Widget::Table,
        }
    }

    pub fn list_columns(&self) -> Vec<&'static str> {
        Self::configured_or(self.list_columns, &[], || self.field_names())
    }

    pub fn show_columns(&self) -> Vec<&'static str> {
        Self::configured_or(self.show_columns, self.show_fieldsets, || self.form_names())
    }

    pub fn add_columns(&self) -> Vec<&'static str> {
        Self::configured_or(self.add_columns, self.add_fieldsets, || self.form_names())
    }

    pub fn edit_columns(&self) -> Vec<&'static str> {
        Self::configured_or(self.edit_columns, self.edit_fieldsets, || self.form_names())
    }

    pub fn search_columns(&self) -> Vec<&'static str> {
        Self::configured_or(self.search_columns, &[], || self.field_names())
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    /**
     * Checks that the view allows an operation.
     *
     * # Arguments
     * `permission`: The operation about to run.
     *
     * # Returns
     * An error of type `NotPermitted` if the view does not allow the operation.
     */
    pub fn require(&self, permission: Permission) -> Result<(), ApplicationError> {
        if self.has_permission(permission) {
            return Ok(());
        }
        Err(ApplicationError::new(ErrorType::NotPermitted, format!("Operation {} is not permitted on {}", permission.name(), self.name)))
    }

    pub fn action(&self, name: &str) -> Result<&'static ActionDef, ApplicationError> {
        self.actions.iter().find(|action| action.name == name).ok_or_else(|| ApplicationError::new(ErrorType::NotFound, format!("Unknown action {name} on {}", self.name)))
    }

    /**
     * Label of a column, either configured or derived from its name.
     */
    pub fn label(&self, column: &str) -> String {
        self.label_columns.iter().find(|(name, _)| *name == column).map_or_else(|| prettify(column), |(_, label)| (*label).to_string())
    }

    fn configured_or(columns: &'static [&'static str], fieldsets: &'static [Fieldset], default: impl FnOnce() -> Vec<&'static str>) -> Vec<&'static str> {
        if !fieldsets.is_empty() {
            return fieldsets.iter().flat_map(|fieldset| fieldset.fields.iter().copied()).collect();
        }
        if !columns.is_empty() {
            return columns.to_vec();
        }
        default()
    }

    fn field_names(&self) -> Vec<&'static str> {
        self.entity.fields.iter().map(|field| field.name).collect()
    }

    fn form_names(&self) -> Vec<&'static str> {
        self.entity.fields.iter().map(|field| field.name).chain(self.entity.many_to_many.iter().map(|relation| relation.name)).collect()
    }
}

/**
 * Turns a column name into a label: `personal_phone` becomes `Personal Phone`.
 */
pub fn prettify(column: &str) -> String {
    column
        .split(['_', '.'])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

const MULTI_DELETE: ActionDef = ActionDef { name: "muldelete", text: "Delete", confirmation: "Delete all Really?", icon: "fa-rocket", multiple: true, single: true, kind: ActionKind::Delete };

const CHANGE_NAME: ActionDef = ActionDef {
    name: "myaction",
    text: "Change Name",
    confirmation: "Do you really want to?",
    icon: "fa-rocket",
    multiple: false,
    single: true,
    kind: ActionKind::SetText { column: "name", value: "Club Member" },
};

const CONTACT_FIELDSETS: &[Fieldset] = &[
    Fieldset { name: "Summary", fields: &["name", "gender", "contact_group"], expanded: true },
    Fieldset { name: "Personal Info", fields: &["address", "birthday", "personal_phone", "personal_celphone"], expanded: false },
];

pub static COUNTRY_STATS_VIEW: ViewConfig = ViewConfig { list_columns: &["country", "stat_date", "population", "unemployed", "college"], ..ViewConfig::new("country_stats", &COUNTRY_STATS) };

pub static COUNTRY_VIEW: ViewConfig = ViewConfig::new("countries", &COUNTRY);

pub static POLITICAL_TYPE_VIEW: ViewConfig = ViewConfig::new("political_types", &POLITICAL_TYPE);

pub static PRODUCT_PUBLIC_VIEW: ViewConfig = ViewConfig {
    label_columns: &[("photo_img", "Photo")],
    list_columns: &["name", "photo_img", "price_label"],
    search_columns: &["name", "price", "product_type"],
    show_fieldsets: &[
        Fieldset { name: "Summary", fields: &["name", "price_label", "photo_img", "product_type"], expanded: true },
        Fieldset { name: "Description", fields: &["description"], expanded: true },
    ],
    permissions: &[Permission::List, Permission::Show],
    list_widget: Widget::Block,
    show_widget: Widget::Block,
    ..ViewConfig::new("products_public", &PRODUCT)
};

pub static PRODUCT_VIEW: ViewConfig = ViewConfig { list_columns: &["name", "price_label"], ..ViewConfig::new("products", &PRODUCT) };

pub static PRODUCT_TYPE_VIEW: ViewConfig = ViewConfig { related_views: &["products"], ..ViewConfig::new("product_types", &PRODUCT_TYPE) };

pub static EMPLOYEE_HISTORY_VIEW: ViewConfig = ViewConfig {
    list_columns: &["department", "begin_date", "end_date"],
    edit_columns: &["end_date"],
    permissions: &[Permission::List, Permission::Show, Permission::Edit],
    ..ViewConfig::new("employee_history", &EMPLOYEE_HISTORY)
};

pub static EMPLOYEE_VIEW: ViewConfig = ViewConfig { list_columns: &["full_name", "department.name", "employee_number"], related_views: &["employee_history"], ..ViewConfig::new("employees", &EMPLOYEE) };

pub static FUNCTION_VIEW: ViewConfig = ViewConfig { related_views: &["employees"], ..ViewConfig::new("functions", &FUNCTION) };

pub static DEPARTMENT_VIEW: ViewConfig = ViewConfig { related_views: &["employees"], ..ViewConfig::new("departments", &DEPARTMENT) };

pub static BENEFIT_VIEW: ViewConfig = ViewConfig { add_columns: &["name"], edit_columns: &["name"], show_columns: &["name"], list_columns: &["name"], ..ViewConfig::new("benefits", &BENEFIT) };

pub static CONTACT_VIEW: ViewConfig = ViewConfig {
    label_columns: &[("contact_group", "Contacts Group")],
    list_columns: &["name", "personal_phone", "contact_group"],
    base_order: Some(("name", SortDirection::Asc)),
    show_fieldsets: CONTACT_FIELDSETS,
    add_fieldsets: CONTACT_FIELDSETS,
    edit_fieldsets: CONTACT_FIELDSETS,
    ..ViewConfig::new("contacts", &CONTACT)
};

pub static CONTACT_GROUP_MASTER_VIEW: ViewConfig = ViewConfig { related_views: &["contacts"], permissions: &[Permission::List, Permission::Show], ..ViewConfig::new("contact_groups_master", &CONTACT_GROUP) };

pub static CONTACT_GROUP_VIEW: ViewConfig = ViewConfig { list_columns: &["name"], related_views: &["contacts"], actions: &[CHANGE_NAME, MULTI_DELETE], ..ViewConfig::new("contact_groups", &CONTACT_GROUP) };

pub static OM_PARENT_VIEW: ViewConfig = ViewConfig { related_views: &["om_children"], actions: &[MULTI_DELETE], ..ViewConfig::new("om_parents", &MODEL_OM_PARENT) };

pub static OM_CHILD_VIEW: ViewConfig = ViewConfig::new("om_children", &MODEL_OM_CHILD);

pub static VIEWS: &[&ViewConfig] = &[
    &COUNTRY_STATS_VIEW,
    &COUNTRY_VIEW,
    &POLITICAL_TYPE_VIEW,
    &PRODUCT_PUBLIC_VIEW,
    &PRODUCT_VIEW,
    &PRODUCT_TYPE_VIEW,
    &EMPLOYEE_HISTORY_VIEW,
    &EMPLOYEE_VIEW,
    &FUNCTION_VIEW,
    &DEPARTMENT_VIEW,
    &BENEFIT_VIEW,
    &CONTACT_VIEW,
    &CONTACT_GROUP_MASTER_VIEW,
    &CONTACT_GROUP_VIEW,
    &OM_PARENT_VIEW,
    &OM_CHILD_VIEW,
];

/**
 * Looks up a registered view by name.
 */
pub fn view(name: &str) -> Result<&'static ViewConfig, ApplicationError> {
    VIEWS.iter().copied().find(|view| view.name == name).ok_or_else(|| ApplicationError::new(ErrorType::NotFound, format!("Unknown view {name}")))
}
