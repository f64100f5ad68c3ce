use crate::api::outbound::{ContactableStatus, DialerContact, PhoneNumberStatus};
use crate::api::Client;
use async_trait::async_trait;
use reconcile::{
    AttributeBuilder, AttributePath, AttributeType, Context, Dynamic, DynamicValue, EntityProxy,
    ManagedResource, Page, RemoteEntity, RemoteError, Result, Schema, SchemaBuilder, SpecPurpose,
    Timeouts,
};
use std::collections::HashMap;
use std::sync::Arc;

use super::invalid;

pub const TYPE_NAME: &str = "genesyscloud_outbound_contact_list_contact";

/// Joins the contact list id and the contact id into one entity id
const ID_SEPARATOR: &str = "_-_";

pub fn contact_entity_id(contact_list_id: &str, contact_id: &str) -> String {
    format!("{}{}{}", contact_list_id, ID_SEPARATOR, contact_id)
}

/// Split an entity id into contact list id and contact id
pub fn split_entity_id(id: &str) -> Option<(&str, &str)> {
    match id.split(ID_SEPARATOR).collect::<Vec<_>>().as_slice() {
        [list, contact] if !list.is_empty() && !contact.is_empty() => Some((*list, *contact)),
        _ => None,
    }
}

/// A contact addressed by its list-qualified id
#[derive(Debug, Clone)]
pub struct ContactEntity {
    pub id: String,
    pub contact: DialerContact,
}

impl ContactEntity {
    fn new(contact_list_id: &str, contact: DialerContact) -> Self {
        let contact_id = contact.id.as_deref().unwrap_or_default();
        Self {
            id: contact_entity_id(contact_list_id, contact_id),
            contact,
        }
    }
}

impl RemoteEntity for ContactEntity {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> Option<&str> {
        None
    }
}

fn parse(id: &str) -> std::result::Result<(&str, &str), RemoteError> {
    // no contact can carry an id of the wrong shape
    split_entity_id(id).ok_or_else(|| {
        RemoteError::new(
            404,
            format!(
                "{} is not a contact id of the form <contactListId>{}<contactId>",
                id, ID_SEPARATOR
            ),
        )
    })
}

pub struct ContactProxy {
    client: Arc<Client>,
}

#[async_trait]
impl EntityProxy for ContactProxy {
    type Entity = ContactEntity;
    type Spec = DialerContact;

    async fn create(&self, spec: &DialerContact) -> std::result::Result<ContactEntity, RemoteError> {
        let contact_list_id = spec.contact_list_id.as_deref().unwrap_or_default();
        let stored = self
            .client
            .outbound()
            .create_contact(contact_list_id, spec)
            .await?;
        let contact = stored
            .into_iter()
            .find(|contact| contact.id == spec.id)
            .ok_or_else(|| RemoteError::transport("contact list accepted no contact"))?;
        Ok(ContactEntity::new(contact_list_id, contact))
    }

    async fn get_by_id(&self, id: &str) -> std::result::Result<ContactEntity, RemoteError> {
        let (contact_list_id, contact_id) = parse(id)?;
        let contact = self
            .client
            .outbound()
            .get_contact(contact_list_id, contact_id)
            .await?;
        Ok(ContactEntity::new(contact_list_id, contact))
    }

    // Contacts only exist inside a list, so there is nothing to enumerate
    async fn list_page(
        &self,
        _page_number: u32,
        _page_size: u32,
    ) -> std::result::Result<Page<ContactEntity>, RemoteError> {
        Ok(Page::empty())
    }

    async fn update(
        &self,
        id: &str,
        spec: &DialerContact,
        _expected_version: Option<i64>,
    ) -> std::result::Result<ContactEntity, RemoteError> {
        let (contact_list_id, contact_id) = parse(id)?;
        let contact = DialerContact {
            id: Some(contact_id.to_string()),
            contact_list_id: Some(contact_list_id.to_string()),
            ..spec.clone()
        };
        let updated = self
            .client
            .outbound()
            .update_contact(contact_list_id, contact_id, &contact)
            .await?;
        Ok(ContactEntity::new(contact_list_id, updated))
    }

    async fn delete(&self, id: &str) -> std::result::Result<(), RemoteError> {
        let (contact_list_id, contact_id) = parse(id)?;
        Ok(self
            .client
            .outbound()
            .delete_contact(contact_list_id, contact_id)
            .await?)
    }
}

/// One contact in an outbound contact list. The entity id is
/// `<contactListId>_-_<contactId>`, which is also what import expects.
pub struct ContactResource {
    proxy: ContactProxy,
    schema: Schema,
    timeouts: Timeouts,
}

impl ContactResource {
    pub fn new(client: Arc<Client>) -> Self {
        Self {
            proxy: ContactProxy { client },
            schema: Self::schema_static(),
            timeouts: Timeouts::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn schema_static() -> Schema {
        SchemaBuilder::new()
            .version(1)
            .description("Genesys Cloud outbound contact list contact")
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("contact_list_id", AttributeType::String)
                    .required()
                    .force_new()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("data", AttributeType::Map(Box::new(AttributeType::String)))
                    .optional()
                    .description("Column values, keyed by contact list column name")
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("callable", AttributeType::Bool)
                    .optional()
                    .computed()
                    .description("Whether the contact can be called")
                    .build(),
            )
            .attribute(
                AttributeBuilder::new(
                    "phone_number_status",
                    AttributeType::Map(Box::new(AttributeType::Bool)),
                )
                .optional()
                .description("Whether each phone column can be called")
                .build(),
            )
            .attribute(
                AttributeBuilder::new(
                    "contactable_status",
                    AttributeType::Map(Box::new(AttributeType::Bool)),
                )
                .optional()
                .description("Whether the contact can be reached, keyed by media type")
                .build(),
            )
            .build()
    }

    fn flags(declared: &DynamicValue, name: &str) -> Result<Option<HashMap<String, bool>>> {
        let path = AttributePath::new(name);
        if matches!(declared.get(&path), None | Some(Dynamic::Null)) {
            return Ok(None);
        }
        declared
            .get_map(&path)?
            .into_iter()
            .map(|(key, value)| match value {
                Dynamic::Bool(flag) => Ok((key, flag)),
                _ => Err(invalid(TYPE_NAME, format!("{}.{} must be a bool", name, key))),
            })
            .collect::<Result<HashMap<_, _>>>()
            .map(Some)
    }

    fn data(declared: &DynamicValue) -> Result<Option<HashMap<String, String>>> {
        let path = AttributePath::new("data");
        if matches!(declared.get(&path), None | Some(Dynamic::Null)) {
            return Ok(None);
        }
        declared
            .get_map(&path)?
            .into_iter()
            .map(|(key, value)| match value.as_str() {
                Some(value) => Ok((key, value.to_string())),
                None => Err(invalid(TYPE_NAME, format!("data.{} must be a string", key))),
            })
            .collect::<Result<HashMap<_, _>>>()
            .map(Some)
    }
}

fn flag_map<T>(entries: Option<&HashMap<String, T>>, flag: impl Fn(&T) -> Option<bool>) -> Dynamic {
    match entries {
        Some(entries) => Dynamic::Map(
            entries
                .iter()
                .filter_map(|(key, entry)| flag(entry).map(|f| (key.clone(), Dynamic::Bool(f))))
                .collect(),
        ),
        None => Dynamic::Null,
    }
}

#[async_trait]
impl ManagedResource for ContactResource {
    type Proxy = ContactProxy;

    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn proxy(&self) -> &ContactProxy {
        &self.proxy
    }

    async fn build_spec(
        &self,
        _ctx: &Context,
        declared: &DynamicValue,
        purpose: SpecPurpose,
    ) -> Result<DialerContact> {
        // contacts are created under a client-chosen id
        let id = match purpose {
            SpecPurpose::Create => Some(uuid::Uuid::new_v4().to_string()),
            SpecPurpose::Update => None,
        };

        Ok(DialerContact {
            id,
            contact_list_id: Some(declared.get_string(&AttributePath::new("contact_list_id"))?),
            data: Self::data(declared)?,
            callable: declared.get_optional_bool(&AttributePath::new("callable"))?,
            phone_number_status: Self::flags(declared, "phone_number_status")?.map(|flags| {
                flags
                    .into_iter()
                    .map(|(column, callable)| {
                        (
                            column,
                            PhoneNumberStatus {
                                callable: Some(callable),
                            },
                        )
                    })
                    .collect()
            }),
            contactable_status: Self::flags(declared, "contactable_status")?.map(|flags| {
                flags
                    .into_iter()
                    .map(|(media_type, contactable)| {
                        (
                            media_type,
                            ContactableStatus {
                                contactable: Some(contactable),
                            },
                        )
                    })
                    .collect()
            }),
        })
    }

    fn flatten(&self, entity: &ContactEntity, state: &mut DynamicValue) -> Result<()> {
        let contact = &entity.contact;
        if let Some((contact_list_id, _)) = split_entity_id(&entity.id) {
            state.set_string(
                &AttributePath::new("contact_list_id"),
                contact_list_id.to_string(),
            )?;
        }
        match &contact.data {
            Some(data) => state.set_value(
                &AttributePath::new("data"),
                Dynamic::Map(
                    data.iter()
                        .map(|(key, value)| (key.clone(), Dynamic::from(value.as_str())))
                        .collect(),
                ),
            )?,
            None => state.set_null(&AttributePath::new("data"))?,
        }
        state.set_optional_bool(&AttributePath::new("callable"), contact.callable)?;
        state.set_value(
            &AttributePath::new("phone_number_status"),
            flag_map(contact.phone_number_status.as_ref(), |status| status.callable),
        )?;
        state.set_value(
            &AttributePath::new("contactable_status"),
            flag_map(contact.contactable_status.as_ref(), |status| status.contactable),
        )?;
        Ok(())
    }

    fn timeouts(&self) -> Timeouts {
        self.timeouts
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use crate::api::test_helpers::{create_test_client, quick_backoff, short_timeouts};
    use mockito::{Matcher, Server};
    use reconcile::{ErrorKind, Lifecycle, LocalState, Reconciler, ResourceHandle};

    fn reconciler(url: &str) -> Reconciler<ContactResource> {
        let resource = ContactResource::new(Arc::new(create_test_client(url)))
            .with_timeouts(short_timeouts());
        Reconciler::new(resource).with_backoff(quick_backoff())
    }

    fn declared(phone: &str) -> DynamicValue {
        DynamicValue::from_pairs([
            ("contact_list_id", Dynamic::from("cl-1")),
            (
                "data",
                Dynamic::Map(HashMap::from([
                    ("name".to_string(), Dynamic::from("Ada")),
                    ("phone".to_string(), Dynamic::from(phone)),
                ])),
            ),
            (
                "phone_number_status",
                Dynamic::Map(HashMap::from([("phone".to_string(), Dynamic::Bool(true))])),
            ),
        ])
    }

    const CONTACT: &str = r#"{
        "id": "c-1",
        "contactListId": "cl-1",
        "data": {"name": "Ada", "phone": "+15550100"},
        "callable": true,
        "phoneNumberStatus": {"phone": {"callable": true}}
    }"#;

    #[test]
    fn entity_ids_join_list_and_contact() {
        let id = contact_entity_id("cl-1", "c-1");

        assert_eq!(id, "cl-1_-_c-1");
        assert_eq!(split_entity_id(&id), Some(("cl-1", "c-1")));
        assert_eq!(split_entity_id("c-1"), None);
        assert_eq!(split_entity_id("cl-1_-_"), None);
        assert_eq!(split_entity_id("a_-_b_-_c"), None);
    }

    #[tokio::test]
    async fn import_reads_the_contact_through_its_list() {
        let mut server = Server::new_async().await;
        let get = server
            .mock("GET", "/api/v2/outbound/contactlists/cl-1/contacts/c-1")
            .with_body(CONTACT)
            .expect(1)
            .create_async()
            .await;

        let reconciler = reconciler(&server.url());
        let state = reconciler
            .import(&Context::new(), "cl-1_-_c-1")
            .await
            .unwrap();

        assert_eq!(state.id.as_deref(), Some("cl-1_-_c-1"));
        assert_eq!(state.lifecycle, Lifecycle::Active);
        assert_eq!(
            state
                .values
                .get_string(&AttributePath::new("contact_list_id"))
                .unwrap(),
            "cl-1"
        );
        let data = state.values.get_map(&AttributePath::new("data")).unwrap();
        assert_eq!(data.get("phone"), Some(&Dynamic::from("+15550100")));
        get.assert_async().await;
    }

    #[tokio::test]
    async fn import_of_a_malformed_id_is_not_found() {
        let server = Server::new_async().await;
        let reconciler = reconciler(&server.url());

        let error = reconciler
            .import(&Context::new(), "c-1")
            .await
            .unwrap_err();

        assert_eq!(error.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn create_posts_one_contact_and_records_the_composite_id() {
        let mut server = Server::new_async().await;
        let create = server
            .mock("POST", "/api/v2/outbound/contactlists/cl-1/contacts")
            .match_body(Matcher::Regex(r#"^\[\{.*"contactListId":"cl-1".*\}\]$"#.to_string()))
            .with_body_from_request(|request| {
                // echo the posted contact back, as the platform does
                request.body().map(|body| body.to_vec()).unwrap_or_default()
            })
            .expect(1)
            .create_async()
            .await;
        let _get = server
            .mock("GET", Matcher::Regex(r"^/api/v2/outbound/contactlists/cl-1/contacts/.+$".to_string()))
            .with_body(CONTACT)
            .create_async()
            .await;

        let reconciler = reconciler(&server.url());
        let mut state = LocalState::absent();
        reconciler
            .create(&Context::new(), &mut state, &declared("+15550100"))
            .await
            .unwrap();

        let id = state.id.clone().unwrap();
        let (contact_list_id, contact_id) = split_entity_id(&id).unwrap();
        assert_eq!(contact_list_id, "cl-1");
        assert!(!contact_id.is_empty());
        assert_eq!(state.lifecycle, Lifecycle::Active);
        create.assert_async().await;
    }

    #[tokio::test]
    async fn changed_data_is_written_in_place() {
        let mut server = Server::new_async().await;
        let _get_before = server
            .mock("GET", "/api/v2/outbound/contactlists/cl-1/contacts/c-1")
            .with_body(CONTACT)
            .expect(2)
            .create_async()
            .await;
        let _get_after = server
            .mock("GET", "/api/v2/outbound/contactlists/cl-1/contacts/c-1")
            .with_body(CONTACT.replace("+15550100", "+15550199"))
            .create_async()
            .await;
        let put = server
            .mock("PUT", "/api/v2/outbound/contactlists/cl-1/contacts/c-1")
            .match_body(Matcher::PartialJsonString(
                r#"{"id":"c-1","contactListId":"cl-1","data":{"phone":"+15550199"}}"#.to_string(),
            ))
            .with_body(CONTACT.replace("+15550100", "+15550199"))
            .expect(1)
            .create_async()
            .await;

        let handle: Box<dyn ResourceHandle> = Box::new(reconciler(&server.url()));
        let mut state = LocalState::existing("cl-1_-_c-1");
        let changed = declared("+15550199");
        handle.apply(&Context::new(), &mut state, &changed).await.unwrap();

        assert!(handle.requires_replace(&state, &changed).is_empty());
        assert_eq!(state.lifecycle, Lifecycle::Active);
        put.assert_async().await;
    }

    #[tokio::test]
    async fn delete_addresses_the_contact_in_its_list() {
        let mut server = Server::new_async().await;
        let delete = server
            .mock("DELETE", "/api/v2/outbound/contactlists/cl-1/contacts/c-1")
            .with_status(204)
            .expect(1)
            .create_async()
            .await;
        let _gone = server
            .mock("GET", "/api/v2/outbound/contactlists/cl-1/contacts/c-1")
            .with_status(404)
            .with_body(r#"{"message":"Not found","status":404}"#)
            .create_async()
            .await;

        let reconciler = reconciler(&server.url());
        let mut state = LocalState::existing("cl-1_-_c-1");
        reconciler.delete(&Context::new(), &mut state).await.unwrap();

        assert!(state.is_absent());
        delete.assert_async().await;
    }

    #[test]
    fn flags_must_be_bools() {
        let mut config = declared("+15550100");
        config
            .set_value(
                &AttributePath::new("contactable_status"),
                Dynamic::Map(HashMap::from([("Voice".to_string(), Dynamic::from("yes"))])),
            )
            .unwrap();

        assert!(reconciler("http://localhost").validate(&config).is_err());
    }
}
