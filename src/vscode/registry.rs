//! Windows registry discovery
//!
//! Reads the curated registry locations where Windows and the editor
//! installers leave machine-identity values. Read-only; nothing here writes
//! to the registry. Other platforms compile the empty stub.

/// One registry value found during discovery
#[derive(Debug, Clone)]
pub struct RegistryValue {
    pub key_path: String,
    pub value_name: String,
    pub data: String,
}

impl RegistryValue {
    /// `HKCU\key\name` spelling used as the record path
    pub fn display_path(&self) -> String {
        format!(r"HKCU\{}\{}", self.key_path, self.value_name)
    }

    /// Rendering handed to the classifier
    pub fn rendered(&self) -> String {
        format!("{} = {}", self.display_path(), self.data)
    }
}

#[cfg(windows)]
pub use windows_impl::scan_identity_values;

#[cfg(not(windows))]
pub fn scan_identity_values() -> Vec<RegistryValue> {
    Vec::new()
}

#[cfg(windows)]
mod windows_impl {
    use super::RegistryValue;
    use windows::core::{PCWSTR, PWSTR};
    use windows::Win32::Foundation::ERROR_SUCCESS;
    use windows::Win32::System::Registry::{
        RegCloseKey, RegEnumKeyExW, RegGetValueW, RegOpenKeyExW, HKEY, HKEY_CURRENT_USER,
        KEY_ENUMERATE_SUB_KEYS, KEY_QUERY_VALUE, REG_VALUE_TYPE, RRF_RT_REG_EXPAND_SZ,
        RRF_RT_REG_SZ,
    };

    /// Fixed (key, value) locations holding machine identity
    const VALUE_TEMPLATES: &[(&str, &str)] = &[(r"Software\Microsoft\SQMClient", "MachineId")];

    /// Uninstall entries whose DisplayName mentions one of these products
    const PRODUCT_MARKERS: &[&str] = &["Visual Studio Code", "VSCodium", "Cursor"];

    const UNINSTALL_BASE: &str = r"Software\Microsoft\Windows\CurrentVersion\Uninstall";

    pub fn scan_identity_values() -> Vec<RegistryValue> {
        let mut values = Vec::new();

        for (key_path, value_name) in VALUE_TEMPLATES {
            if let Some(data) = read_string_value(key_path, value_name) {
                values.push(RegistryValue {
                    key_path: (*key_path).to_string(),
                    value_name: (*value_name).to_string(),
                    data,
                });
            }
        }

        for subkey in enum_subkeys(UNINSTALL_BASE) {
            let key_path = format!(r"{}\{}", UNINSTALL_BASE, subkey);
            let Some(display_name) = read_string_value(&key_path, "DisplayName") else {
                continue;
            };
            if PRODUCT_MARKERS
                .iter()
                .any(|marker| display_name.contains(marker))
            {
                values.push(RegistryValue {
                    key_path,
                    value_name: "DisplayName".to_string(),
                    data: display_name,
                });
            }
        }

        values
    }

    /// Read a REG_SZ / REG_EXPAND_SZ value under HKCU, None when absent
    fn read_string_value(key_path: &str, value_name: &str) -> Option<String> {
        let wide_path = to_wide(key_path);
        let mut key = HKEY::default();
        let status = unsafe {
            RegOpenKeyExW(
                HKEY_CURRENT_USER,
                PCWSTR(wide_path.as_ptr()),
                Some(0),
                KEY_QUERY_VALUE,
                &mut key,
            )
        };
        if status != ERROR_SUCCESS {
            return None;
        }

        let wide_name = to_wide(value_name);
        let mut value_type = REG_VALUE_TYPE(0);
        let mut size_bytes: u32 = 0;
        let status = unsafe {
            RegGetValueW(
                key,
                PCWSTR::null(),
                PCWSTR(wide_name.as_ptr()),
                RRF_RT_REG_SZ | RRF_RT_REG_EXPAND_SZ,
                Some(&mut value_type),
                None,
                Some(&mut size_bytes),
            )
        };
        if status != ERROR_SUCCESS {
            let _ = unsafe { RegCloseKey(key) };
            return None;
        }

        let mut buffer: Vec<u16> = vec![0u16; (size_bytes as usize / 2).max(1)];
        let status = unsafe {
            RegGetValueW(
                key,
                PCWSTR::null(),
                PCWSTR(wide_name.as_ptr()),
                RRF_RT_REG_SZ | RRF_RT_REG_EXPAND_SZ,
                Some(&mut value_type),
                Some(buffer.as_mut_ptr() as *mut _),
                Some(&mut size_bytes),
            )
        };
        let _ = unsafe { RegCloseKey(key) };
        if status != ERROR_SUCCESS {
            return None;
        }

        // size includes the terminating null
        let char_len = (size_bytes as usize / 2).saturating_sub(1);
        buffer.truncate(char_len);
        Some(String::from_utf16_lossy(&buffer))
    }

    /// Enumerate direct subkey names of an HKCU key
    fn enum_subkeys(key_path: &str) -> Vec<String> {
        let wide_path = to_wide(key_path);
        let mut key = HKEY::default();
        let status = unsafe {
            RegOpenKeyExW(
                HKEY_CURRENT_USER,
                PCWSTR(wide_path.as_ptr()),
                Some(0),
                KEY_ENUMERATE_SUB_KEYS | KEY_QUERY_VALUE,
                &mut key,
            )
        };
        if status != ERROR_SUCCESS {
            return Vec::new();
        }

        let mut names = Vec::new();
        let mut index: u32 = 0;
        let mut name_buf: [u16; 260] = [0; 260];

        loop {
            let mut name_len = name_buf.len() as u32;
            let status = unsafe {
                RegEnumKeyExW(
                    key,
                    index,
                    Some(PWSTR(name_buf.as_mut_ptr())),
                    &mut name_len,
                    None,
                    None,
                    None,
                    None,
                )
            };
            if status != ERROR_SUCCESS {
                break;
            }
            names.push(String::from_utf16_lossy(&name_buf[..name_len as usize]));
            index += 1;
        }

        let _ = unsafe { RegCloseKey(key) };
        names
    }

    fn to_wide(s: &str) -> Vec<u16> {
        let mut wide: Vec<u16> = s.encode_utf16().collect();
        wide.push(0);
        wide
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_path_spelling() {
        let value = RegistryValue {
            key_path: r"Software\Microsoft\SQMClient".to_string(),
            value_name: "MachineId".to_string(),
            data: "{guid}".to_string(),
        };
        assert_eq!(
            value.display_path(),
            r"HKCU\Software\Microsoft\SQMClient\MachineId"
        );
        assert!(value.rendered().ends_with("= {guid}"));
    }

    #[cfg(not(windows))]
    #[test]
    fn test_stub_returns_empty() {
        assert!(scan_identity_values().is_empty());
    }
}
