//! Default table and foreign key names.

use heck::ToSnakeCase;

/// Derives table and key names from model names.
pub trait NamingStrategy: Send + Sync {
    /// Returns the table for a model, e.g. `BlogPost` -> `blog_posts`.
    fn table_name(&self, model: &str) -> String;

    /// Returns the column that references `model`, e.g. (`User`, `id`) -> `user_id`.
    fn foreign_key(&self, model: &str, primary_key: &str) -> String;
}

/// Snake-cased, pluralized tables and `<model>_<key>` foreign keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnakeCaseNaming;

impl NamingStrategy for SnakeCaseNaming {
    fn table_name(&self, model: &str) -> String {
        pluralizer::pluralize(&model.to_snake_case(), 2, false)
    }

    fn foreign_key(&self, model: &str, primary_key: &str) -> String {
        format!("{}_{primary_key}", model.to_snake_case())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snake_case_naming() {
        let naming = SnakeCaseNaming;
        assert_eq!(naming.table_name("User"), "users");
        assert_eq!(naming.table_name("BlogPost"), "blog_posts");
        assert_eq!(naming.table_name("Category"), "categories");
        assert_eq!(naming.foreign_key("BlogPost", "id"), "blog_post_id");
    }
}
