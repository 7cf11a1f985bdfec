use std::collections::BTreeMap;

use dioxus::prelude::*;
use rfd::FileDialog;

use crate::domain::entities::records::PatientDetail;
use crate::domain::entities::resource::ResourceKey;
use crate::platform::desktop::blocking::run_blocking;
use crate::ui::state::app_state::{app_context, load_patient_detail, AppContext};
use crate::usecase::ports::gateway::GatewayError;
use crate::usecase::ports::view::CardView;
use crate::usecase::services::export_service::ExportService;
use crate::usecase::services::import_service::ImportService;
use crate::usecase::services::query_controller::{FilterInput, UiEvent};

const CELL_STYLE: &str = "border: 1px solid #bbb; border-radius: 6px; padding: 8px 12px;";

fn metric_label(key: &str) -> &str {
    match key {
        "totalPatients" => "患儿总数",
        "totalRecords" => "入住记录数",
        "totalRecordsCount" => "记录月份数",
        "totalFamilies" => "累计家庭数",
        "totalResidents" => "累计入住人数",
        "totalResidenceDays" => "累计入住天数",
        "totalServices" => "累计服务人次",
        "avgFamiliesPerMonth" => "月均家庭数",
        "avgServicesPerMonth" => "月均服务人次",
        "avgDaysPerFamily" => "户均入住天数",
        other => other,
    }
}

fn tab_style(visible: bool) -> &'static str {
    if visible {
        "display: block;"
    } else {
        "display: none;"
    }
}

fn options_with_all(options: impl IntoIterator<Item = (String, String)>) -> Vec<(String, String)> {
    std::iter::once((String::new(), "全部".to_string()))
        .chain(options)
        .collect()
}

#[component]
pub fn App() -> Element {
    let Some(context) = app_context() else {
        return rsx! {
            div {
                p { "应用尚未初始化，无法显示数据" }
            }
        };
    };
    use_context_provider(|| context);

    let mut active = use_signal(|| ResourceKey::Patients);

    rsx! {
        div { style: "font-family: sans-serif; padding: 12px;",
            nav {
                style: "display: flex; gap: 12px; align-items: center; padding: 8px 0;",
                for resource in ResourceKey::ALL {
                    button {
                        key: "{resource}",
                        disabled: active() == resource,
                        onclick: move |_| active.set(resource),
                        "{resource.label()}"
                    }
                }
            }
            for resource in ResourceKey::ALL {
                div {
                    key: "{resource}",
                    style: tab_style(active() == resource),
                    ResourcePanel { resource }
                }
            }
        }
    }
}

#[component]
fn FilterSelect(
    label: String,
    value: String,
    options: Vec<(String, String)>,
    onchange: EventHandler<String>,
) -> Element {
    rsx! {
        label {
            "{label} "
            select {
                onchange: move |event| onchange.call(event.value()),
                for (option_value, option_label) in options {
                    option {
                        key: "{option_value}",
                        value: "{option_value}",
                        selected: option_value == value,
                        "{option_label}"
                    }
                }
            }
        }
    }
}

#[component]
fn ResourcePanel(resource: ResourceKey) -> Element {
    let context = use_context::<AppContext>();
    let panel = context.panels.get(resource).clone();

    let view = use_signal(|| panel.view.borrow().clone());
    use_hook({
        let mut rx = panel.view.clone();
        let mut view = view;
        move || {
            spawn(async move {
                loop {
                    if rx.changed().await.is_err() {
                        break;
                    }
                    let snapshot = rx.borrow_and_update().clone();
                    view.set(snapshot);
                }
            });
        }
    });

    let mut search = use_signal(String::new);
    let mut selects = use_signal(BTreeMap::<FilterInput, String>::new);
    let mut status = use_signal(String::new);
    let mut busy = use_signal(|| false);
    let mut selected_person = use_signal(|| None::<i64>);

    let current = view();
    let descriptor = panel.descriptor.clone();
    let default_sort = descriptor.default_sort.key.clone();
    let bound = |input: FilterInput| panel.bindings.selects.contains(&input);
    let selected = move |input: FilterInput| selects.read().get(&input).cloned();

    let schema_options = |filter_key: &str| {
        options_with_all(
            descriptor
                .filter_schema
                .get(filter_key)
                .map(|spec| spec.options.clone())
                .unwrap_or_default()
                .into_iter()
                .map(|option| (option.clone(), option)),
        )
    };
    let sort_options: Vec<(String, String)> = descriptor
        .sort_options
        .iter()
        .map(|option| (option.value.clone(), option.label.clone()))
        .collect();
    let year_options = options_with_all(
        current
            .filter_options
            .years
            .iter()
            .map(|year| (year.clone(), format!("{year}年"))),
    );
    let month_options = options_with_all(
        current
            .filter_options
            .months
            .iter()
            .map(|month| (month.value.clone(), month.label.clone())),
    );

    let on_search = {
        let panel = panel.clone();
        move |event: FormEvent| {
            let value = event.value();
            search.set(value.clone());
            panel.send(UiEvent::SearchInput(value));
        }
    };

    let on_select = {
        let panel = panel.clone();
        move |input: FilterInput| {
            let panel = panel.clone();
            let mut selects = selects;
            move |value: String| {
                selects.write().insert(input, value.clone());
                panel.send(UiEvent::Select { input, value });
            }
        }
    };

    let on_prev = {
        let panel = panel.clone();
        move |_| panel.send(UiEvent::PrevPage)
    };
    let on_next = {
        let panel = panel.clone();
        move |_| panel.send(UiEvent::NextPage)
    };
    let on_reset = {
        let panel = panel.clone();
        move |_| {
            search.set(String::new());
            selects.write().clear();
            panel.send(UiEvent::Reset);
        }
    };

    let on_import = {
        let context = context.clone();
        let panel = panel.clone();
        move |_| {
            if busy() {
                return;
            }
            let (filter_name, extensions): (&str, &[&str]) = match resource {
                ResourceKey::Patients => ("患儿名单", &["xlsx", "xls", "csv"]),
                _ => ("家庭服务统计表", &["xlsx", "xls"]),
            };
            let Some(path) = FileDialog::new()
                .add_filter(filter_name, extensions)
                .pick_file()
            else {
                status.set("已取消导入".to_string());
                return;
            };

            busy.set(true);
            status.set(format!("正在导入 {}", path.display()));

            let service = ImportService::new(context.db_path.clone());
            let controller = panel.controller.clone();
            let task = context.runtime.spawn(async move {
                let report = run_blocking(move || match resource {
                    ResourceKey::Patients => service.import_patients(&path),
                    _ => service.import_family_services_xlsx(&path),
                })
                .await?;
                controller.reload().await;
                Ok::<_, GatewayError>(report)
            });

            let mut status = status;
            let mut busy = busy;
            spawn(async move {
                let message = match task.await {
                    Ok(Ok(report)) => format!("导入完成：{}", report.summary()),
                    Ok(Err(err)) => format!("导入失败：{err}"),
                    Err(err) => format!("导入失败：{err}"),
                };
                status.set(message);
                busy.set(false);
            });
        }
    };

    let on_export = {
        let context = context.clone();
        let panel = panel.clone();
        move |_| {
            if busy() {
                return;
            }
            let Some(path) = FileDialog::new()
                .add_filter("CSV", &["csv"])
                .set_file_name("家庭服务记录.csv")
                .save_file()
            else {
                status.set("已取消导出".to_string());
                return;
            };

            busy.set(true);
            status.set(format!("正在导出 {}", path.display()));

            let filters = panel.controller.filters();
            let service = ExportService::new(context.db_path.clone());
            let task = context.runtime.spawn(run_blocking(move || {
                service.export_family_services_csv(&filters, &path)
            }));

            let mut status = status;
            let mut busy = busy;
            spawn(async move {
                let message = match task.await {
                    Ok(Ok(count)) => format!("已导出 {count} 条记录"),
                    Ok(Err(err)) => format!("导出失败：{err}"),
                    Err(err) => format!("导出失败：{err}"),
                };
                status.set(message);
                busy.set(false);
            });
        }
    };

    let can_import = matches!(resource, ResourceKey::Patients | ResourceKey::FamilyServices);
    let can_export = resource == ResourceKey::FamilyServices;
    let pagination = current.pagination.clone();
    let metrics: Vec<(String, String, String)> = current
        .overview
        .iter()
        .map(|metric| {
            (
                metric.key.clone(),
                metric_label(&metric.key).to_string(),
                metric.value.clone(),
            )
        })
        .collect();
    let cards: Vec<(String, CardView, Option<i64>)> = current
        .items
        .iter()
        .enumerate()
        .map(|(idx, card)| {
            let key = card.key.clone().unwrap_or_else(|| idx.to_string());
            let person_id = match resource {
                ResourceKey::Patients => key.parse().ok(),
                _ => None,
            };
            (key, card.clone(), person_id)
        })
        .collect();

    rsx! {
        section {
            if !metrics.is_empty() {
                div { style: "display: flex; gap: 12px; flex-wrap: wrap; padding: 8px 0;",
                    for (metric_key, metric_name, metric_value) in metrics {
                        div { key: "{metric_key}", style: CELL_STYLE,
                            div { style: "color: #666; font-size: 12px;", "{metric_name}" }
                            div { style: "font-size: 18px;", "{metric_value}" }
                        }
                    }
                }
            }

            div { style: "display: flex; gap: 12px; align-items: center; flex-wrap: wrap; padding: 8px 0;",
                if panel.bindings.search {
                    input {
                        r#type: "search",
                        placeholder: "搜索",
                        value: "{search}",
                        oninput: on_search,
                    }
                }
                if bound(FilterInput::Sort) {
                    FilterSelect {
                        label: "排序".to_string(),
                        value: selected(FilterInput::Sort).unwrap_or(default_sort.clone()),
                        options: sort_options,
                        onchange: on_select(FilterInput::Sort),
                    }
                }
                if bound(FilterInput::Gender) {
                    FilterSelect {
                        label: "性别".to_string(),
                        value: selected(FilterInput::Gender).unwrap_or_default(),
                        options: schema_options(FilterInput::Gender.filter_key()),
                        onchange: on_select(FilterInput::Gender),
                    }
                }
                if bound(FilterInput::Age) {
                    FilterSelect {
                        label: "年龄段".to_string(),
                        value: selected(FilterInput::Age).unwrap_or_default(),
                        options: schema_options(FilterInput::Age.filter_key()),
                        onchange: on_select(FilterInput::Age),
                    }
                }
                if bound(FilterInput::Year) {
                    FilterSelect {
                        label: "年份".to_string(),
                        value: selected(FilterInput::Year).unwrap_or_default(),
                        options: year_options,
                        onchange: on_select(FilterInput::Year),
                    }
                }
                if bound(FilterInput::Month) {
                    FilterSelect {
                        label: "月份".to_string(),
                        value: selected(FilterInput::Month).unwrap_or_default(),
                        options: month_options,
                        onchange: on_select(FilterInput::Month),
                    }
                }
                button { onclick: on_reset, "重置" }
                if can_import {
                    button { disabled: busy(), onclick: on_import, "导入" }
                }
                if can_export {
                    button { disabled: busy(), onclick: on_export, "导出 CSV" }
                }
            }

            div { style: "display: flex; gap: 12px; color: #555; padding: 4px 0;",
                span { "{current.result_count}" }
                if current.loading {
                    span { "加载中…" }
                }
                if !status().is_empty() {
                    span { "{status}" }
                }
            }

            if let Some(person_id) = selected_person() {
                PatientDetailPanel {
                    key: "{person_id}",
                    person_id,
                    onclose: move |_| selected_person.set(None),
                }
            }

            div { style: "display: grid; grid-template-columns: repeat(auto-fill, minmax(240px, 1fr)); gap: 12px;",
                if current.items.is_empty() && !current.loading {
                    p { "暂无数据" }
                }
                for (card_key, card, person_id) in cards {
                    div {
                        key: "{card_key}",
                        style: CELL_STYLE,
                        onclick: move |_| {
                            if person_id.is_some() {
                                selected_person.set(person_id);
                            }
                        },
                        h3 { style: "margin: 0 0 4px 0;", "{card.title}" }
                        if let Some(subtitle) = card.subtitle {
                            div { style: "color: #666; font-size: 12px;", "{subtitle}" }
                        }
                        for field in card.fields {
                            div {
                                key: "{field.label}",
                                span { style: "color: #666;", "{field.label}：" }
                                span { "{field.value}" }
                            }
                        }
                    }
                }
            }

            if panel.bindings.pagination {
                div { style: "display: flex; gap: 12px; align-items: center; padding: 8px 0;",
                    button { disabled: !pagination.has_prev, onclick: on_prev, "上一页" }
                    span { "{pagination.info}" }
                    button { disabled: !pagination.has_next, onclick: on_next, "下一页" }
                }
            }
        }
    }
}

fn joined(parts: &[Option<&str>]) -> String {
    parts
        .iter()
        .flatten()
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" / ")
}

/// Labelled sections of the patient detail view; empty rows are left out.
fn detail_sections(detail: &PatientDetail) -> Vec<(&'static str, Vec<(String, String)>)> {
    let profile = &detail.profile;
    let mut sections = vec![(
        "基本信息",
        vec![
            ("姓名".to_string(), profile.name.clone()),
            ("身份证号".to_string(), joined(&[profile.id_card.as_deref()])),
            ("性别".to_string(), joined(&[profile.gender.as_deref()])),
            ("出生日期".to_string(), joined(&[profile.birth_date.as_deref()])),
            ("籍贯".to_string(), joined(&[profile.hometown.as_deref()])),
            ("民族".to_string(), joined(&[profile.ethnicity.as_deref()])),
        ],
    )];

    if let Some(family) = &detail.family {
        sections.push((
            "家庭信息",
            vec![
                ("家庭地址".to_string(), joined(&[family.home_address.as_deref()])),
                (
                    "父亲".to_string(),
                    joined(&[
                        family.father_name.as_deref(),
                        family.father_phone.as_deref(),
                        family.father_id_card.as_deref(),
                    ]),
                ),
                (
                    "母亲".to_string(),
                    joined(&[
                        family.mother_name.as_deref(),
                        family.mother_phone.as_deref(),
                        family.mother_id_card.as_deref(),
                    ]),
                ),
                ("其他监护人".to_string(), joined(&[family.other_guardian.as_deref()])),
                ("家庭经济".to_string(), joined(&[family.economic_status.as_deref()])),
            ],
        ));
    }

    sections.push((
        "入住记录",
        detail
            .check_ins
            .iter()
            .map(|check_in| {
                (
                    check_in.checkin_date.clone().unwrap_or_else(|| "-".to_string()),
                    joined(&[
                        check_in.attendees.as_deref(),
                        check_in.details.as_deref(),
                        check_in.treatment_plan.as_deref(),
                    ]),
                )
            })
            .collect(),
    ));
    sections.push((
        "医疗信息",
        detail
            .medical_info
            .iter()
            .map(|medical| {
                (
                    medical.record_date.clone().unwrap_or_else(|| "-".to_string()),
                    joined(&[
                        medical.hospital.as_deref(),
                        medical.diagnosis.as_deref(),
                        medical.doctor_name.as_deref(),
                    ]),
                )
            })
            .collect(),
    ));

    sections
        .into_iter()
        .map(|(title, rows)| {
            let rows = rows
                .into_iter()
                .filter(|(_, value)| !value.is_empty())
                .collect();
            (title, rows)
        })
        .collect()
}

#[component]
fn PatientDetailPanel(person_id: i64, onclose: EventHandler<()>) -> Element {
    let context = use_context::<AppContext>();
    let detail = use_signal(|| None::<PatientDetail>);
    let message = use_signal(|| "加载中…".to_string());

    use_hook(move || {
        let gateway = context.gateway.clone();
        let task = context
            .runtime
            .spawn(async move { load_patient_detail(gateway.as_ref(), person_id).await });
        let mut detail = detail;
        let mut message = message;
        spawn(async move {
            match task.await {
                Ok(Ok(Some(found))) => detail.set(Some(found)),
                Ok(Ok(None)) => message.set("未找到该患儿".to_string()),
                Ok(Err(err)) => message.set(format!("加载详情失败：{err}")),
                Err(err) => message.set(format!("加载详情失败：{err}")),
            }
        });
    });

    let sections = detail.read().as_ref().map(detail_sections).unwrap_or_default();

    rsx! {
        div { style: "{CELL_STYLE} margin: 8px 0; background: #fafafa;",
            div { style: "display: flex; justify-content: space-between; align-items: center;",
                h3 { style: "margin: 0;", "患儿详情" }
                button { onclick: move |_| onclose.call(()), "关闭" }
            }
            if sections.is_empty() {
                p { "{message}" }
            }
            for (title, rows) in sections {
                div { key: "{title}", style: "padding: 4px 0;",
                    h4 { style: "margin: 4px 0;", "{title}" }
                    if rows.is_empty() {
                        div { style: "color: #999;", "暂无记录" }
                    }
                    for (idx, (label, value)) in rows.into_iter().enumerate() {
                        div {
                            key: "{idx}",
                            span { style: "color: #666;", "{label}：" }
                            span { "{value}" }
                        }
                    }
                }
            }
        }
    }
}
