//! Argument transforms and value post-processing against the item/coupon catalogue.

use dagql::{Directive, FieldDecl, FieldPath, NodeName, QueryDocument, TransformOp, Value};
use serde_json::json;

use crate::common::{
    catalogue_host, init_tracing, COUPON_DESC, COUPON_MAP, COUPON_PRICE, IN_COUPON, LIST_CONTAIN,
    TIMES_TEN, USES_COUPON,
};

/// `marketing { coupon(couponId: id) { bindingItemIds @node("itemIdList") } }`
fn bound_item_ids(coupon_id: i64) -> FieldDecl {
    FieldDecl::new("marketing").select(
        FieldDecl::new("coupon")
            .argument("couponId", json!(coupon_id))
            .select(FieldDecl::new("bindingItemIds").directive(Directive::node("itemIdList"))),
    )
}

fn item_list(item_ids: Value) -> FieldDecl {
    FieldDecl::new("itemList")
        .argument("itemIds", item_ids)
        .list()
}

/// Values of `field` across the elements of `commodity.itemList`.
fn column(list: &Value, field: &str) -> Vec<Value> {
    list.as_array()
        .map(|items| items.iter().map(|item| item[field].clone()).collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_map_replaces_argument_with_dependency() {
    init_tracing();
    let query = QueryDocument::new(vec![
        bound_item_ids(1),
        FieldDecl::new("commodity").select(
            item_list(json!(1))
                .directive(Directive::transform(
                    "itemIds",
                    TransformOp::Map,
                    Some(NodeName::new("itemIdList")),
                    "itemIdList",
                ))
                .directive(Directive::filter("onSale"))
                .select(FieldDecl::new("itemId"))
                .select(FieldDecl::new("name"))
                .select(
                    FieldDecl::new("onSale")
                        .alias("isUsedCoupon")
                        .directive(Directive::map(IN_COUPON, Some(NodeName::new("itemIdList")))),
                ),
        ),
    ]);

    let result = catalogue_host().execute(&query).await.unwrap();

    assert!(result.errors.is_empty(), "{:?}", result.errors);
    let list = result.get("commodity.itemList");
    assert_eq!(
        column(&list, "itemId"),
        vec![json!(1), json!(2), json!(4), json!(5), json!(7), json!(8), json!(10)]
    );
    assert!(column(&list, "isUsedCoupon").iter().all(|used| *used == json!(true)));
    assert_eq!(
        result.get("commodity.itemList[2]"),
        json!({ "itemId": 4, "name": "item_name_4", "isUsedCoupon": true })
    );
}

#[tokio::test]
async fn test_filter_keeps_elements_in_dependency() {
    init_tracing();
    let query = QueryDocument::new(vec![
        bound_item_ids(1),
        FieldDecl::new("commodity").select(
            item_list(json!([9, 10, 11, 12]))
                .directive(Directive::transform(
                    "itemIds",
                    TransformOp::Filter,
                    Some(NodeName::new("itemIdList")),
                    LIST_CONTAIN,
                ))
                .select(FieldDecl::new("itemId"))
                .select(FieldDecl::new("onSale")),
        ),
    ]);

    let result = catalogue_host().execute(&query).await.unwrap();

    assert_eq!(
        result.get("commodity.itemList"),
        json!([
            { "itemId": 9, "onSale": false },
            { "itemId": 10, "onSale": true },
        ])
    );
}

#[tokio::test]
async fn test_list_map_rewrites_each_element() {
    init_tracing();
    let query = QueryDocument::new(vec![FieldDecl::new("commodity").select(
        item_list(json!([1, 2, 3]))
            .directive(Directive::transform("itemIds", TransformOp::ListMap, None, TIMES_TEN))
            .select(FieldDecl::new("itemId"))
            .select(FieldDecl::new("name")),
    )]);

    let result = catalogue_host().execute(&query).await.unwrap();

    let list = result.get("commodity.itemList");
    assert_eq!(column(&list, "itemId"), vec![json!(10), json!(20), json!(30)]);
    assert_eq!(
        column(&list, "name"),
        vec![json!("item_name_10"), json!("item_name_20"), json!("item_name_30")]
    );
}

/// Coupon published as an item id -> discount map, consumed by per-item price fields.
fn coupon_price_query(coupon_id: i64) -> QueryDocument {
    QueryDocument::new(vec![
        FieldDecl::new("marketing").select(
            FieldDecl::new("coupon")
                .argument("couponId", json!(coupon_id))
                .directive(Directive::node_converted("itemCouponInfo", COUPON_MAP))
                .select(FieldDecl::new("base"))
                .select(FieldDecl::new("price"))
                .select(FieldDecl::new("bindingItemIds"))
                .select(
                    FieldDecl::new("couponText")
                        .alias("desc")
                        .directive(Directive::map(COUPON_DESC, None)),
                ),
        ),
        FieldDecl::new("commodity").select(
            item_list(json!([9, 10, 11, 12]))
                .select(FieldDecl::new("itemId"))
                .select(FieldDecl::new("salePrice"))
                .select(
                    FieldDecl::new("onSale").alias("isUsedCoupon").directive(Directive::map(
                        USES_COUPON,
                        Some(NodeName::new("itemCouponInfo")),
                    )),
                )
                .select(
                    FieldDecl::new("salePrice").alias("couponPrice").directive(Directive::map(
                        COUPON_PRICE,
                        Some(NodeName::new("itemCouponInfo")),
                    )),
                ),
        ),
    ])
}

#[tokio::test]
async fn test_coupon_price_uses_converted_source() {
    init_tracing();
    let result = catalogue_host()
        .execute(&coupon_price_query(1))
        .await
        .unwrap();

    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.get("marketing.coupon.desc"), json!("满21减13"));

    let list = result.get("commodity.itemList");
    assert_eq!(
        column(&list, "isUsedCoupon"),
        vec![json!(true), json!(true), json!(false), json!(false)]
    );
    assert_eq!(
        column(&list, "couponPrice"),
        vec![json!(78), json!(88), json!(111), json!(121)]
    );
    assert_eq!(
        column(&list, "salePrice"),
        vec![json!(91), json!(101), json!(111), json!(121)]
    );

    let key = FieldPath::parse("marketing.coupon").unwrap();
    let task = result.registry.task(&key).unwrap();
    assert!(matches!(
        task.state(),
        dagql::TaskState::Fulfilled(dagql::TaskValue::Single(Value::Object(map)))
            if map.len() == 10 && map["10"] == json!(13)
    ));
}

#[tokio::test]
async fn test_missing_coupon_skips_price_fields() {
    init_tracing();
    let result = catalogue_host()
        .execute(&coupon_price_query(2))
        .await
        .unwrap();

    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.get("marketing.coupon"), Value::Null);

    let list = result.get("commodity.itemList");
    assert_eq!(column(&list, "isUsedCoupon"), vec![Value::Null; 4]);
    assert_eq!(column(&list, "couponPrice"), vec![Value::Null; 4]);
    assert_eq!(
        column(&list, "salePrice"),
        vec![json!(91), json!(101), json!(111), json!(121)]
    );
    assert_eq!(result.skipped.len(), 8);
}

#[tokio::test]
async fn test_failed_evaluation_fails_only_that_field() {
    init_tracing();
    let query = QueryDocument::new(vec![
        FieldDecl::new("commodity").select(
            item_list(json!(["one"]))
                .directive(Directive::transform("itemIds", TransformOp::ListMap, None, TIMES_TEN))
                .select(FieldDecl::new("itemId")),
        ),
        FieldDecl::new("marketing").select(
            FieldDecl::new("coupon")
                .argument("couponId", json!(1))
                .select(FieldDecl::new("base")),
        ),
    ]);

    let result = catalogue_host().execute(&query).await.unwrap();

    assert_eq!(result.errors.len(), 1);
    let error = &result.errors[0];
    assert_eq!(error.path, FieldPath::parse("commodity.itemList"));
    assert!(error.message.contains(TIMES_TEN), "{}", error.message);
    assert_eq!(result.get("commodity.itemList"), Value::Null);
    assert_eq!(result.get("marketing.coupon.base"), json!(21));
}
