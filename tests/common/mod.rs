// Common fixtures for the integration test suite: an item/coupon catalogue, the expressions
// the queries use, and host setup.

#![allow(dead_code)]

use std::sync::{Arc, Once};
use std::time::Duration;

use dagql::{
    resolver_fn, Bindings, DependencyEngine, EngineConfig, EvaluationError, FetchEnvironment,
    FieldError, FieldResolver, Value,
};
use dagql_test::{binding, MockHost, ScriptedEvaluator};
use serde_json::json;

static TRACING: Once = Once::new();

/// Install a test-writer subscriber once per test binary.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub mod catalogue {
    use serde_json::json;

    use dagql::Value;

    /// Coupon 1 is "21 off 13" and bound to items 1 to 10.
    pub fn coupon(id: i64) -> Value {
        if id != 1 {
            return Value::Null;
        }
        let bound: Vec<i64> = (1..=10).collect();
        json!({
            "couponId": 1,
            "base": 21,
            "price": 13,
            "bindingItemIds": bound,
            "couponText": "",
        })
    }

    /// Items are on sale unless their id is a multiple of 3.
    pub fn item(id: i64) -> Value {
        json!({
            "itemId": id,
            "name": format!("item_name_{id}"),
            "salePrice": id * 10 + 1,
            "onSale": id % 3 != 0,
        })
    }

    /// Integer ids of a scalar or list argument.
    pub fn ids(value: &Value) -> Vec<i64> {
        match value {
            Value::Array(values) => values.iter().filter_map(Value::as_i64).collect(),
            other => other.as_i64().into_iter().collect(),
        }
    }
}

fn int(expression: &str, bindings: &Bindings, name: &str) -> Result<i64, EvaluationError> {
    binding(bindings, expression, name)?
        .as_i64()
        .ok_or(EvaluationError::TypeMismatch {
            expression: expression.to_string(),
            expected: "integer",
        })
}

/// Coupon value of the current item, if the coupon map covers it.
fn coupon_for_item(expression: &str, bindings: &Bindings) -> Result<Option<i64>, EvaluationError> {
    let item = int(expression, bindings, "itemId")?;
    let coupons = binding(bindings, expression, "itemCouponInfo")?;
    Ok(coupons.get(item.to_string()).and_then(Value::as_i64))
}

pub const LIST_CONTAIN: &str = "listContain(itemIdList,ele)";
pub const IN_COUPON: &str = "listContain(itemIdList,itemId)";
pub const TIMES_TEN: &str = "ele*10";
pub const COUPON_MAP: &str = "list2MapWithAssignedValue('bindingItemIds','price')";
pub const COUPON_DESC: &str = "'满' + base + '减' + price";
pub const USES_COUPON: &str = "seq.get(itemCouponInfo,itemId)!=nil";
pub const COUPON_PRICE: &str =
    "salePrice - (seq.get(itemCouponInfo,itemId) == nil? 0:seq.get(itemCouponInfo,itemId))";

pub fn evaluator() -> ScriptedEvaluator {
    ScriptedEvaluator::new()
        .script(LIST_CONTAIN, |bindings| {
            let ele = binding(bindings, LIST_CONTAIN, "ele")?;
            let list = binding(bindings, LIST_CONTAIN, "itemIdList")?;
            Ok(json!(list.as_array().is_some_and(|ids| ids.contains(ele))))
        })
        .script(IN_COUPON, |bindings| {
            let item = binding(bindings, IN_COUPON, "itemId")?;
            let list = binding(bindings, IN_COUPON, "itemIdList")?;
            Ok(json!(list.as_array().is_some_and(|ids| ids.contains(item))))
        })
        .script(TIMES_TEN, |bindings| {
            Ok(json!(int(TIMES_TEN, bindings, "ele")? * 10))
        })
        .script(COUPON_MAP, |bindings| {
            let price = binding(bindings, COUPON_MAP, "price")?.clone();
            let ids = catalogue::ids(binding(bindings, COUPON_MAP, "bindingItemIds")?);
            let map: serde_json::Map<String, Value> = ids
                .into_iter()
                .map(|id| (id.to_string(), price.clone()))
                .collect();
            Ok(Value::Object(map))
        })
        .script(COUPON_DESC, |bindings| {
            let base = int(COUPON_DESC, bindings, "base")?;
            let price = int(COUPON_DESC, bindings, "price")?;
            Ok(json!(format!("满{base}减{price}")))
        })
        .script(USES_COUPON, |bindings| {
            Ok(json!(coupon_for_item(USES_COUPON, bindings)?.is_some()))
        })
        .script(COUPON_PRICE, |bindings| {
            let price = int(COUPON_PRICE, bindings, "salePrice")?;
            let discount = coupon_for_item(COUPON_PRICE, bindings)?.unwrap_or(0);
            Ok(json!(price - discount))
        })
}

pub fn engine() -> DependencyEngine {
    let config = EngineConfig::builder()
        .evaluator(evaluator())
        .build()
        .expect("valid engine config");
    DependencyEngine::new(config)
}

/// Host serving `commodity.itemList` and `marketing.coupon` from the catalogue.
pub fn catalogue_host() -> MockHost {
    MockHost::new(engine())
        .root(json!({ "commodity": {}, "marketing": {} }))
        .resolver(
            "commodity.itemList",
            resolver_fn(|env: FetchEnvironment| async move {
                let ids = env
                    .arguments
                    .get("itemIds")
                    .map(catalogue::ids)
                    .unwrap_or_default();
                Ok::<_, FieldError>(Value::Array(ids.into_iter().map(catalogue::item).collect()))
            }),
        )
        .resolver(
            "marketing.coupon",
            resolver_fn(|env: FetchEnvironment| async move {
                let id = env
                    .arguments
                    .get("couponId")
                    .and_then(Value::as_i64)
                    .unwrap_or_default();
                Ok::<_, FieldError>(catalogue::coupon(id))
            }),
        )
}

/// Resolver producing `value` after `delay`.
pub fn delayed(value: Value, delay: Duration) -> Arc<dyn FieldResolver> {
    resolver_fn(move |_env: FetchEnvironment| {
        let value = value.clone();
        async move {
            tokio::time::sleep(delay).await;
            Ok::<_, FieldError>(value)
        }
    })
}

/// Resolver failing with `message`.
pub fn failing(message: &'static str) -> Arc<dyn FieldResolver> {
    resolver_fn(move |_env: FetchEnvironment| async move {
        Err::<Value, _>(FieldError::new(message))
    })
}
