//! The shared template library.
//!
//! Framework scaffold files, UI component sources and the generation
//! instructions, shared by every conversation behind an `Arc`. The library
//! is immutable once built and content-addressed: each file carries the
//! SHA-256 of its content and the library as a whole has a digest over all
//! of them, so two libraries with the same digest render identical context.
//!
//! Nothing is copied into a workspace. The assembler references library
//! files by path and materializes only the scaffold plus the components the
//! predictor selected.

use crate::tracker::fingerprint;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One immutable library file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryFile {
    pub path: String,
    pub content: Arc<str>,
    pub digest: String,
}

impl LibraryFile {
    fn new(path: impl Into<String>, content: &str) -> Self {
        Self {
            path: path.into(),
            digest: fingerprint(content),
            content: Arc::from(content),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateLibrary {
    instructions: String,
    scaffold: BTreeMap<String, LibraryFile>,
    components: BTreeMap<String, LibraryFile>,
    digest: String,
}

impl TemplateLibrary {
    pub fn builder(instructions: impl Into<String>) -> TemplateLibraryBuilder {
        TemplateLibraryBuilder {
            instructions: instructions.into(),
            components_dir: "src/components/ui/".into(),
            scaffold: BTreeMap::new(),
            components: BTreeMap::new(),
        }
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    /// Scaffold files, in path order.
    pub fn scaffold(&self) -> impl Iterator<Item = &LibraryFile> {
        self.scaffold.values()
    }

    /// Every component name the library offers, sorted.
    pub fn component_names(&self) -> impl Iterator<Item = &str> {
        self.components.keys().map(String::as_str)
    }

    pub fn component(&self, name: &str) -> Option<&LibraryFile> {
        self.components.get(name)
    }

    /// Component name for a path inside the components directory.
    pub fn component_for_path(&self, path: &str) -> Option<&str> {
        self.components
            .iter()
            .find(|(_, file)| file.path == path)
            .map(|(name, _)| name.as_str())
    }

    /// Content digest over instructions, scaffold and components.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// The built-in React + Vite + Tailwind starter.
    pub fn react_starter() -> Self {
        let mut builder = Self::builder(REACT_INSTRUCTIONS);
        for (path, content) in REACT_SCAFFOLD {
            builder = builder.scaffold_file(*path, content);
        }
        for (name, content) in REACT_COMPONENTS {
            builder = builder.component(*name, content);
        }
        builder.build()
    }
}

pub struct TemplateLibraryBuilder {
    instructions: String,
    components_dir: String,
    scaffold: BTreeMap<String, LibraryFile>,
    components: BTreeMap<String, LibraryFile>,
}

impl TemplateLibraryBuilder {
    /// Directory component files live under; must end with `/`.
    pub fn components_dir(mut self, dir: impl Into<String>) -> Self {
        self.components_dir = dir.into();
        self
    }

    pub fn scaffold_file(mut self, path: impl Into<String>, content: &str) -> Self {
        let file = LibraryFile::new(path, content);
        self.scaffold.insert(file.path.clone(), file);
        self
    }

    /// Add a component stored at `<components_dir><name>.tsx`.
    pub fn component(mut self, name: &str, content: &str) -> Self {
        let path = format!("{}{name}.tsx", self.components_dir);
        self.components
            .insert(name.to_string(), LibraryFile::new(path, content));
        self
    }

    pub fn build(self) -> TemplateLibrary {
        let mut hasher = Sha256::new();
        hasher.update(self.instructions.as_bytes());
        for file in self.scaffold.values().chain(self.components.values()) {
            hasher.update(file.path.as_bytes());
            hasher.update([0]);
            hasher.update(file.digest.as_bytes());
        }
        TemplateLibrary {
            instructions: self.instructions,
            scaffold: self.scaffold,
            components: self.components,
            digest: hex::encode(hasher.finalize()),
        }
    }
}

const REACT_INSTRUCTIONS: &str = "\
You build complete, working React applications with Vite, TypeScript and Tailwind CSS.

Work only through the tools. Write whole files with write_file, or change existing files \
with apply_patch using search/replace edits that match the current content exactly. Never \
leave placeholders such as \"keep existing code\" or \"rest of file unchanged\".

The project scaffold and the UI components relevant to the request are shown as files. \
Import UI components from \"@/components/ui/<name>\". If you need a component that is not \
shown, call load_component before using it. Add npm packages with add_dependency.

src/App.tsx is the entry point. Keep components small and typed. When the application is \
complete, reply with a short summary and stop calling tools.";

const REACT_SCAFFOLD: &[(&str, &str)] = &[
    (
        "index.html",
        r#"<!doctype html>
<html lang="en">
  <head>
    <meta charset="UTF-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1.0" />
    <title>App</title>
  </head>
  <body>
    <div id="root"></div>
    <script type="module" src="/src/main.tsx"></script>
  </body>
</html>
"#,
    ),
    (
        "package.json",
        r#"{
  "name": "app",
  "private": true,
  "version": "0.0.0",
  "type": "module",
  "scripts": {
    "dev": "vite",
    "build": "tsc -b && vite build"
  },
  "dependencies": {
    "clsx": "^2.1.1",
    "react": "^18.3.1",
    "react-dom": "^18.3.1",
    "tailwind-merge": "^2.5.2"
  },
  "devDependencies": {
    "@types/react": "^18.3.5",
    "@types/react-dom": "^18.3.0",
    "@vitejs/plugin-react": "^4.3.1",
    "autoprefixer": "^10.4.20",
    "postcss": "^8.4.45",
    "tailwindcss": "^3.4.10",
    "typescript": "^5.5.3",
    "vite": "^5.4.1"
  }
}
"#,
    ),
    (
        "src/index.css",
        "@tailwind base;\n@tailwind components;\n@tailwind utilities;\n",
    ),
    (
        "src/lib/utils.ts",
        r#"import { clsx, type ClassValue } from "clsx";
import { twMerge } from "tailwind-merge";

export function cn(...inputs: ClassValue[]) {
  return twMerge(clsx(inputs));
}
"#,
    ),
    (
        "src/main.tsx",
        r#"import React from "react";
import ReactDOM from "react-dom/client";
import App from "./App";
import "./index.css";

ReactDOM.createRoot(document.getElementById("root")!).render(
  <React.StrictMode>
    <App />
  </React.StrictMode>,
);
"#,
    ),
    (
        "tailwind.config.js",
        r#"export default {
  content: ["./index.html", "./src/**/*.{ts,tsx}"],
  theme: { extend: {} },
  plugins: [],
};
"#,
    ),
    (
        "tsconfig.json",
        r#"{
  "compilerOptions": {
    "target": "ES2020",
    "module": "ESNext",
    "jsx": "react-jsx",
    "strict": true,
    "moduleResolution": "bundler",
    "baseUrl": ".",
    "paths": { "@/*": ["./src/*"] }
  },
  "include": ["src"]
}
"#,
    ),
    (
        "vite.config.ts",
        r#"import path from "path";
import react from "@vitejs/plugin-react";
import { defineConfig } from "vite";

export default defineConfig({
  plugins: [react()],
  resolve: { alias: { "@": path.resolve(__dirname, "./src") } },
});
"#,
    ),
];

const REACT_COMPONENTS: &[(&str, &str)] = &[
    (
        "avatar",
        r#"import { cn } from "@/lib/utils";

export function Avatar({ src, alt, className }: { src?: string; alt: string; className?: string }) {
  return (
    <span className={cn("inline-flex h-10 w-10 overflow-hidden rounded-full bg-gray-200", className)}>
      {src ? <img src={src} alt={alt} className="h-full w-full object-cover" /> : <span className="m-auto text-sm">{alt.slice(0, 2)}</span>}
    </span>
  );
}
"#,
    ),
    (
        "badge",
        r#"import { cn } from "@/lib/utils";

export function Badge({ className, ...props }: React.HTMLAttributes<HTMLSpanElement>) {
  return <span className={cn("rounded-full border px-2.5 py-0.5 text-xs font-semibold", className)} {...props} />;
}
"#,
    ),
    (
        "button",
        r#"import * as React from "react";
import { cn } from "@/lib/utils";

export interface ButtonProps extends React.ButtonHTMLAttributes<HTMLButtonElement> {
  variant?: "default" | "outline" | "ghost";
}

export const Button = React.forwardRef<HTMLButtonElement, ButtonProps>(
  ({ className, variant = "default", ...props }, ref) => (
    <button
      ref={ref}
      className={cn(
        "inline-flex items-center justify-center rounded-md px-4 py-2 text-sm font-medium disabled:opacity-50",
        variant === "default" && "bg-gray-900 text-white hover:bg-gray-800",
        variant === "outline" && "border border-gray-300 hover:bg-gray-100",
        variant === "ghost" && "hover:bg-gray-100",
        className,
      )}
      {...props}
    />
  ),
);
Button.displayName = "Button";
"#,
    ),
    (
        "calendar",
        r#"export function Calendar({ value, onChange }: { value?: string; onChange: (date: string) => void }) {
  return <input type="date" value={value} onChange={(e) => onChange(e.target.value)} className="rounded-md border px-3 py-2" />;
}
"#,
    ),
    (
        "card",
        r#"import { cn } from "@/lib/utils";

export function Card({ className, ...props }: React.HTMLAttributes<HTMLDivElement>) {
  return <div className={cn("rounded-lg border bg-white shadow-sm", className)} {...props} />;
}

export function CardHeader({ className, ...props }: React.HTMLAttributes<HTMLDivElement>) {
  return <div className={cn("flex flex-col space-y-1.5 p-6", className)} {...props} />;
}

export function CardContent({ className, ...props }: React.HTMLAttributes<HTMLDivElement>) {
  return <div className={cn("p-6 pt-0", className)} {...props} />;
}
"#,
    ),
    (
        "chart",
        r#"export function BarChart({ data }: { data: { label: string; value: number }[] }) {
  const max = Math.max(1, ...data.map((d) => d.value));
  return (
    <div className="flex h-40 items-end gap-2">
      {data.map((d) => (
        <div key={d.label} className="flex-1 bg-gray-900" style={{ height: `${(d.value / max) * 100}%` }} title={d.label} />
      ))}
    </div>
  );
}
"#,
    ),
    (
        "checkbox",
        r#"import { cn } from "@/lib/utils";

export function Checkbox({ checked, onCheckedChange, className }: { checked: boolean; onCheckedChange: (checked: boolean) => void; className?: string }) {
  return (
    <input
      type="checkbox"
      checked={checked}
      onChange={(e) => onCheckedChange(e.target.checked)}
      className={cn("h-4 w-4 rounded border-gray-300", className)}
    />
  );
}
"#,
    ),
    (
        "dialog",
        r#"export function Dialog({ open, onClose, children }: { open: boolean; onClose: () => void; children: React.ReactNode }) {
  if (!open) return null;
  return (
    <div className="fixed inset-0 flex items-center justify-center bg-black/50" onClick={onClose}>
      <div className="rounded-lg bg-white p-6" onClick={(e) => e.stopPropagation()}>
        {children}
      </div>
    </div>
  );
}
"#,
    ),
    (
        "input",
        r#"import * as React from "react";
import { cn } from "@/lib/utils";

export const Input = React.forwardRef<HTMLInputElement, React.InputHTMLAttributes<HTMLInputElement>>(
  ({ className, ...props }, ref) => (
    <input ref={ref} className={cn("flex h-10 w-full rounded-md border px-3 py-2 text-sm", className)} {...props} />
  ),
);
Input.displayName = "Input";
"#,
    ),
    (
        "label",
        r#"export function Label(props: React.LabelHTMLAttributes<HTMLLabelElement>) {
  return <label className="text-sm font-medium" {...props} />;
}
"#,
    ),
    (
        "progress",
        r#"export function Progress({ value }: { value: number }) {
  return (
    <div className="h-2 w-full overflow-hidden rounded-full bg-gray-200">
      <div className="h-full bg-gray-900" style={{ width: `${Math.min(100, Math.max(0, value))}%` }} />
    </div>
  );
}
"#,
    ),
    (
        "select",
        r#"export function Select({ value, options, onChange }: { value: string; options: string[]; onChange: (v: string) => void }) {
  return (
    <select value={value} onChange={(e) => onChange(e.target.value)} className="rounded-md border px-3 py-2 text-sm">
      {options.map((o) => (
        <option key={o} value={o}>{o}</option>
      ))}
    </select>
  );
}
"#,
    ),
    (
        "slider",
        r#"export function Slider({ value, min = 0, max = 100, onChange }: { value: number; min?: number; max?: number; onChange: (v: number) => void }) {
  return <input type="range" min={min} max={max} value={value} onChange={(e) => onChange(Number(e.target.value))} className="w-full" />;
}
"#,
    ),
    (
        "switch",
        r#"export function Switch({ checked, onCheckedChange }: { checked: boolean; onCheckedChange: (v: boolean) => void }) {
  return (
    <button
      role="switch"
      aria-checked={checked}
      onClick={() => onCheckedChange(!checked)}
      className={`h-6 w-11 rounded-full ${checked ? "bg-gray-900" : "bg-gray-300"}`}
    />
  );
}
"#,
    ),
    (
        "table",
        r#"export function Table({ columns, rows }: { columns: string[]; rows: React.ReactNode[][] }) {
  return (
    <table className="w-full text-sm">
      <thead>
        <tr>{columns.map((c) => <th key={c} className="border-b p-2 text-left">{c}</th>)}</tr>
      </thead>
      <tbody>
        {rows.map((row, i) => (
          <tr key={i}>{row.map((cell, j) => <td key={j} className="border-b p-2">{cell}</td>)}</tr>
        ))}
      </tbody>
    </table>
  );
}
"#,
    ),
    (
        "tabs",
        r#"import { useState } from "react";

export function Tabs({ tabs }: { tabs: { label: string; content: React.ReactNode }[] }) {
  const [active, setActive] = useState(0);
  return (
    <div>
      <div className="flex gap-2 border-b">
        {tabs.map((t, i) => (
          <button key={t.label} onClick={() => setActive(i)} className={i === active ? "border-b-2 border-gray-900 px-3 py-2" : "px-3 py-2"}>
            {t.label}
          </button>
        ))}
      </div>
      <div className="pt-4">{tabs[active]?.content}</div>
    </div>
  );
}
"#,
    ),
    (
        "toast",
        r#"export function Toast({ message, onDismiss }: { message: string; onDismiss: () => void }) {
  return (
    <div className="fixed bottom-4 right-4 rounded-md bg-gray-900 px-4 py-3 text-white" onClick={onDismiss}>
      {message}
    </div>
  );
}
"#,
    ),
];
