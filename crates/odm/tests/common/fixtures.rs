//! Entity fixtures.
//!
//! `User` lives alone in the `users` index; `Post` and `Comment` share the
//! `blog` index, with `Comment` declared as a child of `Post`. `Ticket` has a
//! numeric identifier.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use helios_odm::backend::SearchClient;
use helios_odm::mapping::{
    ClassAnnotation, FieldDeclaration, FieldKind, PropertyDeclaration, StaticDriver,
    TypeDeclaration,
};
use helios_odm::{Entity, OdmConfig, SearchManager};

/// A user account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Option<String>,
    pub name: String,
    pub username: String,
}

impl Entity for User {
    const CLASS_NAME: &'static str = "User";
}

impl User {
    pub fn new(id: &str, name: &str, username: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            name: name.to_string(),
            username: username.to_string(),
        }
    }
}

/// A blog post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub title: String,
}

impl Entity for Post {
    const CLASS_NAME: &'static str = "Post";
}

/// A comment on a blog post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub body: String,
    pub author_name: String,
    pub post_id: String,
}

impl Entity for Comment {
    const CLASS_NAME: &'static str = "Comment";
}

impl Comment {
    pub fn new(id: &str, post_id: &str, body: &str) -> Self {
        Self {
            id: id.to_string(),
            body: body.to_string(),
            author_name: "hash".to_string(),
            post_id: post_id.to_string(),
        }
    }
}

/// A support ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: u64,
    pub title: String,
}

impl Entity for Ticket {
    const CLASS_NAME: &'static str = "Ticket";
}

/// Mapping declarations of every fixture type.
pub fn fixture_driver() -> StaticDriver {
    let driver = StaticDriver::new();
    driver.register_entity::<User>(
        TypeDeclaration::new()
            .annotate(ClassAnnotation::elastic_searchable("users", "user"))
            .property(PropertyDeclaration::new("id").id())
            .property(PropertyDeclaration::new("name").field(FieldDeclaration::of(FieldKind::Text)))
            .property(
                PropertyDeclaration::new("username").field(FieldDeclaration::of(FieldKind::Keyword)),
            ),
    );
    driver.register_entity::<Post>(
        TypeDeclaration::new()
            .annotate(ClassAnnotation::elastic_searchable("blog", "post"))
            .property(PropertyDeclaration::new("id").id())
            .property(PropertyDeclaration::new("title").field(FieldDeclaration::of(FieldKind::Text))),
    );
    driver.register_entity::<Comment>(
        TypeDeclaration::new()
            .annotate(ClassAnnotation::ElasticSearchable {
                index: Some("blog".to_string()),
                type_name: Some("comment".to_string()),
                number_of_shards: None,
                number_of_replicas: None,
                parent: Some("post".to_string()),
                ttl: None,
                boost: None,
                source: None,
            })
            .property(PropertyDeclaration::new("id").id())
            .property(PropertyDeclaration::new("body").field(FieldDeclaration::of(FieldKind::Text)))
            .property(
                PropertyDeclaration::new("authorName").field(FieldDeclaration {
                    name: Some("author_name".to_string()),
                    ..FieldDeclaration::of(FieldKind::Keyword)
                }),
            )
            .property(PropertyDeclaration::new("postId").param("_parent")),
    );
    driver.register_entity::<Ticket>(
        TypeDeclaration::new()
            .annotate(ClassAnnotation::elastic_searchable("tickets", "ticket"))
            .property(PropertyDeclaration::new("id").id())
            .property(PropertyDeclaration::new("title").field(FieldDeclaration::of(FieldKind::Text))),
    );
    driver
}

/// Creates a manager over the given client with the fixture mappings.
pub fn create_manager(config: OdmConfig, client: Arc<dyn SearchClient>) -> SearchManager {
    SearchManager::new(config, client, Arc::new(fixture_driver()))
        .expect("Failed to create search manager")
}
