//! Storefront API catalogue.
//!
//! | Endpoint | Request | Tags |
//! |---|---|---|
//! | `getEvents` | `GET /events?city&q&page` | provides `EventList`, `Event:<id>` per item |
//! | `getEvent` | `GET /events/{id}` | provides `Event:<id>` |
//! | `getCities` | `GET /cities` | provides `CityList` |
//! | `getOrders` | `GET /orders` | provides `OrderList` |
//! | `createEvent` | `POST /events` | invalidates `EventList` |
//! | `updateEvent` | `PATCH /events/{id}` | invalidates `Event:<id>`, `EventList` |
//! | `deleteEvent` | `DELETE /events/{id}` | invalidates `Event:<id>`, `EventList` |
//! | `purchaseTickets` | `POST /events/{id}/checkout` | invalidates `Event:<id>`, `OrderList` |

use marquee_core::http::Method;
use marquee_query::tag::list_tags;
use marquee_query::{Api, CacheConfig, Endpoint, Tag};
use serde_json::Value;
use std::time::Duration;

/// Event list, filtered by `city`, `q` and `page`
pub const GET_EVENTS: &str = "getEvents";
/// One event by `id`
pub const GET_EVENT: &str = "getEvent";
/// Cities events can be filtered by
pub const GET_CITIES: &str = "getCities";
/// The signed-in user's orders
pub const GET_ORDERS: &str = "getOrders";
/// Create an event
pub const CREATE_EVENT: &str = "createEvent";
/// Edit an event by `id`
pub const UPDATE_EVENT: &str = "updateEvent";
/// Delete an event by `id`
pub const DELETE_EVENT: &str = "deleteEvent";
/// Buy tickets for an event by `id`; answers with the checkout redirect
pub const PURCHASE_TICKETS: &str = "purchaseTickets";

/// Collection tag of event lists
pub const EVENT_LIST: &str = "EventList";
/// Collection tag of the city list
pub const CITY_LIST: &str = "CityList";
/// Collection tag of the order list
pub const ORDER_LIST: &str = "OrderList";
/// Entity tag kind of events
pub const EVENT: &str = "Event";

/// Cities rarely change
const CITIES_TTL: Duration = Duration::from_secs(600);

/// `Event:<id>` for the `id` argument, if present
fn event_tag(args: &Value) -> Vec<Tag> {
    args.get("id")
        .map(|id| vec![Tag::entity(EVENT, id)])
        .unwrap_or_default()
}

/// Every storefront endpoint, with `config` as cache defaults
#[must_use]
pub fn storefront_api(config: CacheConfig) -> Api {
    Api::new()
        .with_config(config)
        .endpoint(
            Endpoint::query(GET_EVENTS, "/events")
                .provides(|result, _| list_tags(EVENT_LIST, EVENT, result)),
        )
        .endpoint(Endpoint::query(GET_EVENT, "/events/{id}").provides(|_, args| event_tag(args)))
        .endpoint(
            Endpoint::query(GET_CITIES, "/cities")
                .provides(|_, _| vec![Tag::collection(CITY_LIST)])
                .with_ttl(CITIES_TTL),
        )
        .endpoint(
            Endpoint::query(GET_ORDERS, "/orders").provides(|_, _| vec![Tag::collection(ORDER_LIST)]),
        )
        .endpoint(
            Endpoint::mutation(CREATE_EVENT, Method::Post, "/events")
                .invalidates(|_, _| vec![Tag::collection(EVENT_LIST)]),
        )
        .endpoint(
            Endpoint::mutation(UPDATE_EVENT, Method::Patch, "/events/{id}").invalidates(|_, args| {
                let mut tags = event_tag(args);
                tags.push(Tag::collection(EVENT_LIST));
                tags
            }),
        )
        .endpoint(
            Endpoint::mutation(DELETE_EVENT, Method::Delete, "/events/{id}").invalidates(|_, args| {
                let mut tags = event_tag(args);
                tags.push(Tag::collection(EVENT_LIST));
                tags
            }),
        )
        .endpoint(
            Endpoint::mutation(PURCHASE_TICKETS, Method::Post, "/events/{id}/checkout").invalidates(
                |_, args| {
                    let mut tags = event_tag(args);
                    tags.push(Tag::collection(ORDER_LIST));
                    tags
                },
            ),
        )
}
