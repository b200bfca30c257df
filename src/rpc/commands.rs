// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Request builders for the known commands: each produces the typed object
//! the server expects as the serialized argument of the matching
//! APPLY-family call.

use crate::cfg::config::LocaleConfig;
use crate::obj::WireMode;
use crate::obj::typed_object::TypedObject;

pub fn set_locale(mode: WireMode, locale: &LocaleConfig, charset: i64) -> TypedObject {
    let mut obj = TypedObject::new(mode);
    obj.set_int("LANGUAGE", locale.language);
    obj.set_int("CHARACTER_SET", charset);
    obj.set_int("PLATFORM_ENUM", locale.platform);
    obj.set_string("PLATFORM_VERSION_IMAGE", "rust");
    obj.set_int("UTC_OFFSET", locale.utc_offset);
    obj.set_int("SDF_AN_custom_date_order", 0);
    obj.set_int("SDF_AN_custom_scan_fields", 0);
    obj.set_string("SDF_AN_date_separator", "/");
    obj.set_int("SDF_AN_date_order", 2);
    obj.set_bool("SDF_AN_day_leading_zero", true);
    obj.set_bool("SDF_AN_month_leading_zero", true);
    obj.set_bool("SDF_AN_century", true);
    obj.set_string("SDF_AN_time_separator", ":");
    obj.set_bool("SDF_AN_hours_24", true);
    obj.set_bool("SDF_AN_hour_leading_zero", true);
    obj.set_bool("SDF_AN_noon_is_zero", false);
    obj.set_string("SDF_AN_am", "AM");
    obj.set_string("SDF_AN_pm", "PM");
    obj.append_ints("PLATFORM_EXTRA", &[0, 0, 0, 0]);
    obj.set_string("APPLICATION_CODE", "");
    obj
}

pub fn authenticate_user(
    mode: WireMode,
    username: &str,
    obfuscated_password: &str,
    trusted: bool,
    auth_data: Option<&str>,
) -> TypedObject {
    let mut obj = TypedObject::new(mode);
    obj.set_bool("CONNECT_POOLING", false);
    obj.set_string("USER_PASSWORD", obfuscated_password);
    obj.set_bool("AUTHENTICATION_ONLY", false);
    obj.set_bool("CHECK_ONLY", false);
    obj.set_string("LOGON_NAME", username);
    if trusted {
        obj.set_bool("TRUSTED_LOGIN_ALLOWED", true);
        obj.set_string("OS_LOGON_NAME", username);
    }
    if let Some(auth_data) = auth_data {
        obj.set_string("CLIENT_AUTH_DATA", auth_data);
    }
    obj
}

pub fn server_config(mode: WireMode) -> TypedObject {
    let mut obj = TypedObject::new(mode);
    obj.set_string("OBJECT_TYPE", "dm_server_config");
    obj.set_bool("FOR_REVERT", false);
    obj.set_int("CACHE_VSTAMP", 0);
    obj
}

pub fn docbase_config(mode: WireMode) -> TypedObject {
    let mut obj = TypedObject::new(mode);
    obj.set_string("OBJECT_TYPE", "dm_docbase_config");
    obj.set_bool("FOR_REVERT", false);
    obj.set_int("CACHE_VSTAMP", 0);
    obj
}

pub fn fetch_type(mode: WireMode, type_name: &str, vstamp: i64) -> TypedObject {
    let mut obj = TypedObject::new(mode);
    obj.set_string("TYPE_NAME", type_name);
    obj.set_int("CACHE_VSTAMP", vstamp);
    obj
}

pub fn get_errors(mode: WireMode) -> TypedObject {
    let mut obj = TypedObject::new(mode);
    obj.set_string("OBJECT_TYPE", "dmError");
    obj
}

pub fn execute(
    mode: WireMode,
    query: &str,
    for_update: bool,
    batch_hint: i64,
    bof_dql: bool,
) -> TypedObject {
    let mut obj = TypedObject::new(mode);
    obj.set_string("QUERY", query);
    obj.set_bool("FOR_UPDATE", for_update);
    obj.set_int("BATCH_HINT", batch_hint);
    obj.set_bool("BOF_DQL", bof_dql);
    obj
}

pub fn exec_select_sql(mode: WireMode, query: &str, batch_hint: i64) -> TypedObject {
    let mut obj = TypedObject::new(mode);
    obj.set_string("QUERY", query);
    obj.set_int("BATCH_HINT", batch_hint);
    obj
}

pub fn exec_sql(mode: WireMode, query: &str) -> TypedObject {
    let mut obj = TypedObject::new(mode);
    obj.set_string("QUERY", query);
    obj
}

#[allow(clippy::too_many_arguments)]
pub fn make_puller(
    mode: WireMode,
    object_id: &str,
    store_id: &str,
    content_id: &str,
    format_id: &str,
    ticket: i64,
    other: bool,
    offline: bool,
    compression: bool,
) -> TypedObject {
    let mut obj = TypedObject::new(mode);
    obj.set_id("SYSOBJ_ID", object_id);
    obj.set_id("STORE", store_id);
    obj.set_id("CONTENT", content_id);
    obj.set_id("FORMAT", format_id);
    obj.set_int("TICKET", ticket);
    obj.set_bool("IS_OTHER", other);
    obj.set_bool("IS_OFFLINE", offline);
    obj.set_bool("COMPRESSION", compression);
    obj
}

pub fn kill_puller(mode: WireMode, handle: i64) -> TypedObject {
    let mut obj = TypedObject::new(mode);
    obj.set_int("HANDLE", handle);
    obj
}

pub fn make_pusher(mode: WireMode, store: &str, compression: bool) -> TypedObject {
    let mut obj = TypedObject::new(mode);
    obj.set_id("STORE", store);
    obj.set_bool("COMPRESSION", compression);
    obj
}

#[allow(clippy::too_many_arguments)]
pub fn start_push(
    mode: WireMode,
    handle: i64,
    content_id: &str,
    format_id: &str,
    size: u64,
    d_ticket: i64,
    is_other: bool,
    compression: bool,
) -> TypedObject {
    let mut obj = TypedObject::new(mode);
    obj.set_int("HANDLE", handle);
    obj.set_id("CONTENT_ID", content_id);
    obj.set_id("FORMAT", format_id);
    obj.set_int("D_TICKET", d_ticket);
    obj.set_int("SIZE", (size & 0xFFFF_FFFF) as i64);
    obj.set_int("SIZE_LOW", (size & 0xFFFF_FFFF) as i64);
    obj.set_int("SIZE_HIGH", (size >> 32) as i64);
    obj.set_bool("IS_OTHER", is_other);
    obj.set_bool("COMPRESSION", compression);
    obj.set_bool("CAN_USE_NEW_CALLBACKS", true);
    obj.set_string("ENCODED_CONTENT_ATTRS", "");
    obj.set_int("I_PARTITION", 0);
    obj
}

pub fn end_push_v2(mode: WireMode, handle: i64) -> TypedObject {
    let mut obj = TypedObject::new(mode);
    obj.set_int("HANDLE", handle);
    obj
}

pub fn set_push_object_status(mode: WireMode, object_id: &str, value: bool) -> TypedObject {
    let mut obj = TypedObject::new(mode);
    obj.set_id("_PUSHED_ID_", object_id);
    obj.set_bool("_PUSH_STATUS_", value);
    obj
}

#[derive(Debug, Clone, Default)]
pub struct DoMethodOptions {
    pub arguments: Option<String>,
    pub timeout: Option<i64>,
    pub launch_direct: Option<bool>,
    pub launch_async: Option<bool>,
    pub save_results: Option<bool>,
    pub run_as_server: Option<bool>,
    pub trace_launch: Option<bool>,
}

pub fn do_method(mode: WireMode, method: &str, options: &DoMethodOptions) -> TypedObject {
    let mut obj = TypedObject::new(mode);
    obj.set_string("METHOD", method);
    if let Some(arguments) = &options.arguments {
        obj.set_string("ARGUMENTS", arguments);
    }
    if let Some(timeout) = options.timeout {
        obj.set_int("TIME_OUT", timeout);
    }
    if let Some(direct) = options.launch_direct {
        obj.set_bool("LAUNCH_DIRECT", direct);
    }
    if let Some(launch_async) = options.launch_async {
        obj.set_bool("LAUNCH_ASYNC", launch_async);
    }
    if let Some(save) = options.save_results {
        obj.set_bool("SAVE_RESULTS", save);
    }
    if let Some(as_server) = options.run_as_server {
        obj.set_bool("RUN_AS_SERVER", as_server);
    }
    if let Some(trace) = options.trace_launch {
        obj.set_bool("TRACE_LAUNCH", trace);
    }
    obj
}

pub fn encrypt_password(mode: WireMode, obfuscated: &str) -> TypedObject {
    let mut obj = TypedObject::new(mode);
    obj.set_string("PASSWORD_TO_ENCRYPT", obfuscated);
    obj
}

pub fn encrypt_text(mode: WireMode, obfuscated: &str) -> TypedObject {
    let mut obj = TypedObject::new(mode);
    obj.set_string("TEXT_TO_ENCRYPT", obfuscated);
    obj
}

pub fn get_login(
    mode: WireMode,
    username: &str,
    scope: &str,
    server_name: Option<&str>,
    timeout: i64,
    single_use: bool,
) -> TypedObject {
    let mut obj = TypedObject::new(mode);
    obj.set_string("OPTIONAL_USER_NAME", username);
    if !scope.is_empty() {
        obj.set_string("LOGIN_TICKET_SCOPE", scope);
    }
    if let Some(server_name) = server_name {
        obj.set_string("SERVER_NAME", server_name);
    }
    if timeout > 0 {
        obj.set_int("LOGIN_TICKET_TIMEOUT", timeout);
    }
    obj.set_bool("SINGLE_USE", single_use);
    obj
}

pub fn convert_id(
    mode: WireMode,
    format: &str,
    page: i64,
    page_modifier: &str,
) -> TypedObject {
    let mut obj = TypedObject::new(mode);
    obj.set_int("page", page);
    obj.set_string("format", format);
    obj.set_string("page_modifier", page_modifier);
    obj.set_bool("convert", false);
    obj.set_bool("useconvert", false);
    obj
}

pub fn next_id_list(mode: WireMode, tag: i64, how_many: i64) -> TypedObject {
    let mut obj = TypedObject::new(mode);
    obj.set_int("TAG", tag);
    obj.set_int("HOW_MANY", how_many);
    obj
}

pub fn folder_id_find_by_path(mode: WireMode, path: &str) -> TypedObject {
    let mut obj = TypedObject::new(mode);
    obj.set_string("_FOLDER_PATH_", path);
    obj
}

pub fn dql_match(mode: WireMode, query_type: &str, predicate: &str) -> TypedObject {
    let mut obj = TypedObject::new(mode);
    obj.set_string("QUERY_TYPE", query_type);
    obj.set_string("QUERY_PREDICATE", predicate);
    obj
}

pub fn server_dir(mode: WireMode, path: &str, dirs: bool, files: bool, links: bool) -> TypedObject {
    let mut obj = TypedObject::new(mode);
    obj.set_string("DIRECTORY", path);
    obj.set_bool("LIST_DIR", dirs);
    obj.set_bool("LIST_FILE", files);
    obj.set_bool("LIST_LINK", links);
    obj
}

pub fn set_options(mode: WireMode, option: &str, value: bool) -> TypedObject {
    let mut obj = TypedObject::new(mode);
    obj.set_string("OPTION", option);
    obj.set_bool("VALUE", value);
    obj
}

pub fn get_object_info(mode: WireMode, object_id: &str) -> TypedObject {
    let mut obj = TypedObject::new(mode);
    obj.set_id("OBJECT_ID", object_id);
    obj.set_bool("FETCH_IMMUTABILITY_STATUS", false);
    obj
}

pub fn get_dist_content_map(
    mode: WireMode,
    format: &str,
    page_number: i64,
    page_modifier: &str,
    request_time: i64,
) -> TypedObject {
    let mut obj = TypedObject::new(mode);
    obj.set_string("format", format);
    obj.set_int("page_number", page_number);
    obj.set_string("page_modifier", page_modifier);
    obj.set_string("netloc_id", "");
    obj.set_string("request_time", &request_time.to_string());
    obj.set_string("expire_delta", "360");
    obj.set_bool("lookup_resourcefork_info", false);
    obj.set_bool("include_surrogate_get", true);
    obj
}

pub fn audit_on(mode: WireMode, event: &str) -> TypedObject {
    let mut obj = TypedObject::new(mode);
    obj.set_string("EVENT", event);
    obj
}

pub fn acl_obj_get_permit(mode: WireMode, accessor: &str) -> TypedObject {
    let mut obj = TypedObject::new(mode);
    obj.set_string("_ACC_NAME_", accessor);
    obj
}

pub fn dump_cache(mode: WireMode, tag: i64) -> TypedObject {
    let mut obj = TypedObject::new(mode);
    obj.set_int("TAG", tag);
    obj
}

pub fn get_file(
    mode: WireMode,
    storage_id: &str,
    format_id: &str,
    content_id: &str,
    data_ticket: i64,
) -> TypedObject {
    let mut obj = TypedObject::new(mode);
    obj.set_id("STORAGE", storage_id);
    obj.set_id("FORMAT", format_id);
    obj.set_id("CONTENT", content_id);
    obj.set_int("D_TICKET", data_ticket);
    obj.set_bool("MAC_CLIENT", false);
    obj
}

pub fn put_file(mode: WireMode, storage_id: &str, file: &str, format_id: &str) -> TypedObject {
    let mut obj = TypedObject::new(mode);
    obj.set_id("STORAGE", storage_id);
    obj.set_string("FILE", file);
    obj.set_id("FORMAT", format_id);
    obj.set_bool("MAC_CLIENT", false);
    obj
}

/// Docbroker request envelopes; always legacy serialization.
pub mod docbroker {
    use super::{TypedObject, WireMode};

    pub const SOFTWARE_VERSION: &str = "0.0.1 rust";

    fn base_request(request_name: &str, handle: &str) -> TypedObject {
        let mut obj = TypedObject::new(WireMode::LEGACY);
        obj.set_string("DBR_REQUEST_NAME", request_name);
        obj.set_int("DBR_REQUEST_VERSION", 1);
        obj.set_string("DBR_REQUEST_HANDLE", handle);
        obj.set_string("DBR_SOFTWARE_VERSION", SOFTWARE_VERSION);
        obj
    }

    pub fn docbase_map(handle: &str) -> TypedObject {
        base_request("DBRN_GET_DOCBASE_MAP", handle)
    }

    pub fn server_map(handle: &str, docbase: &str) -> TypedObject {
        let mut obj = TypedObject::new(WireMode::LEGACY);
        obj.set_string("r_docbase_name", docbase);
        obj.set_string("r_map_name", "mn_cs_map");
        let base = base_request("DBRN_GET_SERVER_MAP", handle);
        for attr in base.attrs() {
            obj.add(attr.clone());
        }
        obj
    }
}
