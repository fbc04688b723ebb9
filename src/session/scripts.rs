//! Shell scripts run inside the sandbox, and the project skeleton written at
//! bootstrap.

use crate::config::DEV_SERVER_PORT;
use crate::provider::shell_quote;

/// Stylesheet touched after bootstrap so the build tool regenerates it.
pub const STYLESHEET: &str = "src/index.css";

/// Build-tool configuration files touched after an install.
pub const CONFIG_FILES: &[&str] = &["vite.config.js", "tailwind.config.js", "postcss.config.js"];

/// Files of the minimal runnable project, relative to the project directory.
pub fn skeleton_files() -> Vec<(&'static str, &'static str)> {
    vec![
        ("package.json", PACKAGE_JSON),
        ("index.html", INDEX_HTML),
        ("vite.config.js", VITE_CONFIG),
        ("tailwind.config.js", TAILWIND_CONFIG),
        ("postcss.config.js", POSTCSS_CONFIG),
        ("src/main.jsx", MAIN_JSX),
        ("src/App.jsx", APP_JSX),
        (STYLESHEET, INDEX_CSS),
    ]
}

pub fn baseline_install(project_dir: &str) -> String {
    format!(
        "cd {} && npm install --no-audit --no-fund --loglevel=error",
        shell_quote(project_dir)
    )
}

pub fn install_packages(project_dir: &str, packages: &[String]) -> String {
    let quoted: Vec<String> = packages.iter().map(|p| shell_quote(p)).collect();
    format!(
        "cd {} && npm install --no-audit --no-fund --loglevel=warn {} 2>&1",
        shell_quote(project_dir),
        quoted.join(" ")
    )
}

pub fn kill_installer() -> String {
    "pkill -f 'npm install' || true".to_string()
}

pub fn stop_dev_server() -> String {
    "pkill -f 'vite' || true; pkill -f 'npm run dev' || true".to_string()
}

pub fn start_dev_server(project_dir: &str) -> String {
    format!(
        "cd {} && nohup npm run dev -- --host 0.0.0.0 --port {} > /tmp/devserver.log 2>&1 &",
        shell_quote(project_dir),
        DEV_SERVER_PORT
    )
}

pub fn touch_stylesheet(project_dir: &str) -> String {
    format!("touch {}", shell_quote(&format!("{}/{}", project_dir, STYLESHEET)))
}

pub fn touch_config(project_dir: &str) -> String {
    let files: Vec<String> = CONFIG_FILES
        .iter()
        .map(|f| shell_quote(&format!("{}/{}", project_dir, f)))
        .collect();
    format!("touch {}", files.join(" "))
}

pub fn read_package_json(project_dir: &str) -> String {
    format!(
        "cat {}",
        shell_quote(&format!("{}/package.json", project_dir))
    )
}

pub fn check_project(project_dir: &str) -> String {
    format!("test -d {} && echo ok", shell_quote(project_dir))
}

const PACKAGE_JSON: &str = r#"{
  "name": "sandbox-app",
  "private": true,
  "version": "0.0.0",
  "type": "module",
  "scripts": {
    "dev": "vite",
    "build": "vite build",
    "preview": "vite preview"
  },
  "dependencies": {
    "react": "^18.3.1",
    "react-dom": "^18.3.1"
  },
  "devDependencies": {
    "@vitejs/plugin-react": "^4.3.1",
    "autoprefixer": "^10.4.19",
    "postcss": "^8.4.38",
    "tailwindcss": "^3.4.4",
    "vite": "^5.3.1"
  }
}
"#;

const INDEX_HTML: &str = r#"<!doctype html>
<html lang="en">
  <head>
    <meta charset="UTF-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1.0" />
    <title>Sandbox App</title>
  </head>
  <body>
    <div id="root"></div>
    <script type="module" src="/src/main.jsx"></script>
  </body>
</html>
"#;

const VITE_CONFIG: &str = r#"import { defineConfig } from 'vite'
import react from '@vitejs/plugin-react'

export default defineConfig({
  plugins: [react()],
  server: {
    host: '0.0.0.0',
    port: 5173,
    strictPort: true,
    hmr: { clientPort: 443 },
  },
})
"#;

const TAILWIND_CONFIG: &str = r#"/** @type {import('tailwindcss').Config} */
export default {
  content: ['./index.html', './src/**/*.{js,ts,jsx,tsx}'],
  theme: { extend: {} },
  plugins: [],
}
"#;

const POSTCSS_CONFIG: &str = r#"export default {
  plugins: {
    tailwindcss: {},
    autoprefixer: {},
  },
}
"#;

const MAIN_JSX: &str = r#"import React from 'react'
import ReactDOM from 'react-dom/client'
import App from './App.jsx'
import './index.css'

ReactDOM.createRoot(document.getElementById('root')).render(
  <React.StrictMode>
    <App />
  </React.StrictMode>,
)
"#;

const APP_JSX: &str = r#"function App() {
  return (
    <div className="min-h-screen flex items-center justify-center bg-gray-900 text-white">
      <h1 className="text-3xl font-semibold">Sandbox ready</h1>
    </div>
  )
}

export default App
"#;

const INDEX_CSS: &str = r#"@tailwind base;
@tailwind components;
@tailwind utilities;
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skeleton_contains_entry_and_stylesheet() {
        let files = skeleton_files();
        let paths: Vec<&str> = files.iter().map(|(p, _)| *p).collect();
        assert!(paths.contains(&"package.json"));
        assert!(paths.contains(&"src/main.jsx"));
        assert!(paths.contains(&STYLESHEET));
    }

    #[test]
    fn skeleton_package_json_is_valid() {
        let parsed: serde_json::Value = serde_json::from_str(PACKAGE_JSON).unwrap();
        assert_eq!(parsed["dependencies"]["react"], "^18.3.1");
    }

    #[test]
    fn install_script_quotes_every_package() {
        let script = install_packages("/home/user/app", &["lodash".into(), "@scope/x@1".into()]);
        assert!(script.contains("'lodash' '@scope/x@1'"));
        assert!(script.starts_with("cd '/home/user/app' && npm install"));
    }
}
