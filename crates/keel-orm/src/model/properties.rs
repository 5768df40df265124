//! JSON snapshots of model instances.

use serde_json::{Map, Value as Json};

use super::{Model, Related};

impl Model {
    /// Returns the attributes and computed fields as a JSON object.
    ///
    /// With `include_relations`, loaded relations are nested under their
    /// names. An instance already being rendered higher up the path is
    /// rendered again without its relations, so cycles terminate.
    #[must_use]
    pub fn properties(&self, include_relations: bool) -> Json {
        let mut path = Vec::new();
        self.render(include_relations, &mut path)
    }

    fn render(&self, include_relations: bool, path: &mut Vec<Self>) -> Json {
        let mut object = Map::new();
        let schema = self.schema();
        for (name, value) in self.attributes_ref().iter() {
            object.insert(name.clone(), Json::from(value));
        }
        for field in schema.fields() {
            if let Some(compute) = field.computation() {
                let value = compute(&*self.attributes_ref());
                object.insert(field.name().to_string(), Json::from(&value));
            }
        }

        let on_path = path.iter().any(|model| model.ptr_eq(self));
        if include_relations && !on_path {
            path.push(self.clone());
            for name in self.loaded_relations() {
                let Ok(related) = self.relation(&name) else {
                    continue;
                };
                let rendered = match related {
                    Related::One(None) => Json::Null,
                    Related::One(Some(model)) => model.render(true, path),
                    Related::Many(models) => Json::Array(
                        models.iter().map(|model| model.render(true, path)).collect(),
                    ),
                };
                object.insert(name, rendered);
            }
            path.pop();
        }
        Json::Object(object)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use keel_core::{row, Value};
    use serde_json::json;

    use crate::model::{Model, Related};
    use crate::schema::{FieldDef, ModelSchema, RelationSpec};

    #[test]
    fn test_properties_with_and_without_relations() {
        let user_schema = Arc::new(
            ModelSchema::new("User")
                .table("users")
                .field("name")
                .field_def(FieldDef::new("shout").computed(|row| {
                    Value::from(row.get("name").and_then(Value::as_str).unwrap_or_default().to_uppercase())
                }))
                .relation(RelationSpec::has_many("posts", "Post")),
        );
        let post_schema = Arc::new(
            ModelSchema::new("Post")
                .table("posts")
                .field("title")
                .relation(RelationSpec::belongs_to("author", "User")),
        );

        let user = Model::hydrate(&user_schema, row! { "id" => 1, "name" => "ada" });
        let post = Model::hydrate(&post_schema, row! { "id" => 10, "title" => "Hello" });
        user.set_loaded("posts", Related::Many(vec![post.clone()]));
        post.set_loaded("author", Related::One(Some(user.clone())));

        assert_eq!(
            user.properties(false),
            json!({ "id": 1, "name": "ada", "shout": "ADA" })
        );
        assert_eq!(
            user.properties(true),
            json!({
                "id": 1,
                "name": "ada",
                "shout": "ADA",
                "posts": [{
                    "id": 10,
                    "title": "Hello",
                    "author": { "id": 1, "name": "ada", "shout": "ADA" }
                }]
            })
        );
    }
}
